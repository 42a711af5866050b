//! Production summary over real backends

use comanda_core::storage::SqliteStorage;
use comanda_core::{DatabaseCore, Document, DocumentStore, Role};
use serde_json::{json, Value};

fn doc(value: Value) -> Document {
    Document::from_value(value).unwrap()
}

#[test]
fn test_cancelled_order_excluded_from_summary() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage
        .write(&doc(json!({
            "pedidos": [
                {"id": 1, "fechaEntrega": "2024-05-01", "estado": "pendiente"},
                {"id": 2, "fechaEntrega": "2024-05-01", "estado": "cancelado"}
            ],
            "detallesPedido": [
                {"pedidoId": 1, "productoId": 10, "productoNombre": "Pan", "cantidad": 5, "subtotal": 5000},
                {"pedidoId": 2, "productoId": 10, "productoNombre": "Pan", "cantidad": 100, "subtotal": 100000}
            ]
        })))
        .unwrap();
    let db = DatabaseCore::new(storage);

    let summary = db.summarize_production("2024-05-01").unwrap().to_value();
    assert_eq!(summary["perProduct"].as_array().unwrap().len(), 1);
    assert_eq!(summary["perProduct"][0]["productoId"], 10);
    assert_eq!(summary["perProduct"][0]["cantidadTotal"], 5);
    assert_eq!(summary["perProduct"][0]["subtotalTotal"], 5000);
    assert_eq!(
        summary["totals"],
        json!({"totalPedidos": 1, "totalProductos": 1, "totalUnidades": 5, "totalMonto": 5000})
    );
}

#[test]
fn test_summary_does_not_write() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    // Legacy document: the registry would patch it on a normal read
    let legacy = doc(json!({"pedidos": [{"id": 1, "fechaEntrega": "2024-05-01", "estado": "pendiente"}]}));
    storage.write(&legacy).unwrap();
    let db = DatabaseCore::new(storage);

    db.summarize_production("2024-05-01").unwrap();
    assert_eq!(db.store().load().unwrap(), legacy);
}

#[test]
fn test_per_order_breakdown_with_many_orders() {
    let db = DatabaseCore::new(SqliteStorage::open_in_memory().unwrap());
    for (casino, producto, nombre, cantidad) in [
        (1, 10, "Pan amasado", 20),
        (2, 10, "Pan amasado", 30),
        (2, 11, "Empanada", 12),
    ] {
        let pedido = db
            .insert_record(
                "pedidos",
                json!({"casinoId": casino, "empresaId": 1, "fechaEntrega": "2024-06-10", "estado": "pendiente"})
                    .as_object()
                    .unwrap()
                    .clone(),
                Role::Operador,
            )
            .unwrap();
        db.insert_record(
            "detallesPedido",
            json!({
                "pedidoId": pedido["id"],
                "productoId": producto,
                "productoNombre": nombre,
                "cantidad": cantidad,
                "subtotal": cantidad * 100
            })
            .as_object()
            .unwrap()
            .clone(),
            Role::Operador,
        )
        .unwrap();
    }

    let summary = db.summarize_production("2024-06-10").unwrap();
    let names: Vec<&str> = summary.per_product.iter().map(|p| p.producto_nombre.as_str()).collect();
    assert_eq!(names, vec!["Empanada", "Pan amasado"]);
    assert_eq!(summary.per_product[1].cantidad_total, 50.0);
    assert_eq!(summary.totals.total_pedidos, 3);
    assert_eq!(summary.totals.total_productos, 2);
    assert_eq!(summary.totals.total_unidades, 62.0);
    assert_eq!(summary.totals.total_monto, 6200.0);

    assert_eq!(summary.per_customer_breakdown.len(), 3);
    for order in &summary.per_customer_breakdown {
        assert_eq!(order.detalles.len(), 1);
        assert_eq!(order.detalles[0]["pedidoId"], order.pedido_id);
    }
}
