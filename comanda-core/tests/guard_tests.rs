//! Write-authorization tests through the database facade

use comanda_core::collections::{DETALLES_PEDIDO, PEDIDOS, USERS};
use comanda_core::storage::{FileStorage, MemoryStorage};
use comanda_core::{ComandaError, DatabaseCore, Document, DocumentStore, Role};
use serde_json::{json, Value};
use tempfile::TempDir;

fn doc(value: Value) -> Document {
    Document::from_value(value).unwrap()
}

fn seeded() -> DatabaseCore<MemoryStorage> {
    let storage = MemoryStorage::with_document(&doc(json!({
        "users": [
            {"id": 1, "username": "ana", "role": "admin", "passwordHash": "h"}
        ],
        "empresas": [], "casinos": [], "productos": [], "precios": [], "pagos": [],
        "pedidos": [
            {"id": 1, "fechaEntrega": "2024-05-01", "estado": "pendiente"},
            {"id": 2, "fechaEntrega": "2024-05-01", "estado": "pendiente"}
        ],
        "detallesPedido": [
            {"id": 1, "pedidoId": 1, "productoId": 10, "cantidad": 5}
        ]
    })))
    .unwrap();
    DatabaseCore::new(storage)
}

fn expect_violation(result: comanda_core::Result<()>, collection: &str) {
    match result {
        Err(ComandaError::AuthorizationViolation { collection: c, .. }) => assert_eq!(c, collection),
        other => panic!("expected violation on {}, got {:?}", collection, other),
    }
}

#[test]
fn test_operator_field_change_accepted() {
    let db = seeded();
    let mut d = db.read().unwrap();
    d.collection_mut(PEDIDOS)[0].insert("estado".to_string(), json!("entregado"));

    db.write(d, Role::Operador).unwrap();
    assert_eq!(db.read().unwrap().collection(PEDIDOS)[0]["estado"], "entregado");
}

#[test]
fn test_operator_shrink_rejected_and_nothing_written() {
    let db = seeded();
    let before = db.store().raw();
    let mut d = db.read().unwrap();
    d.collection_mut(PEDIDOS).pop();

    expect_violation(db.write(d, Role::Operador), PEDIDOS);
    assert_eq!(db.store().raw(), before);
}

#[test]
fn test_operator_id_swap_rejected() {
    let db = seeded();
    let mut d = db.read().unwrap();
    // Same length: record 2 replaced by a new record 3
    d.collection_mut(PEDIDOS)[1].insert("id".to_string(), json!(3));

    expect_violation(db.write(d, Role::Operador), PEDIDOS);
}

#[test]
fn test_violation_names_the_offending_collection() {
    let db = seeded();
    let mut d = db.read().unwrap();
    d.collection_mut(DETALLES_PEDIDO).clear();

    expect_violation(db.write(d, Role::Operador), DETALLES_PEDIDO);
}

#[test]
fn test_admin_may_delete() {
    let db = seeded();
    let mut d = db.read().unwrap();
    d.collection_mut(PEDIDOS).retain(|p| p["id"] != 2);

    db.write(d, Role::Admin).unwrap();
    assert_eq!(db.read().unwrap().collection(PEDIDOS).len(), 1);
}

#[test]
fn test_users_cannot_be_overwritten_by_any_role() {
    for role in [Role::Admin, Role::Operador] {
        let db = seeded();
        let mut d = db.read().unwrap();
        d.set_collection(
            USERS,
            vec![json!({"id": 1, "username": "ana", "role": "operador", "passwordHash": "stolen"})
                .as_object()
                .unwrap()
                .clone()],
        );
        d.collection_mut(USERS)
            .push(json!({"id": 2, "username": "eve", "role": "admin"}).as_object().unwrap().clone());

        db.write(d, role).unwrap();

        let users = db.read().unwrap().collection(USERS).to_vec();
        assert_eq!(users.len(), 1, "{}", role);
        assert_eq!(users[0]["role"], "admin");
        assert_eq!(users[0]["passwordHash"], "h");
    }
}

#[test]
fn test_partial_write_guarded() {
    let db = seeded();
    let patch = doc(json!({"pedidos": [{"id": 1, "estado": "entregado"}]}));
    expect_violation(db.write_partial(patch, Role::Operador), PEDIDOS);

    let patch = doc(json!({"pedidos": [
        {"id": 2, "estado": "entregado"},
        {"id": 1, "estado": "entregado"},
        {"id": 3, "estado": "pendiente"}
    ]}));
    db.write_partial(patch, Role::Operador).unwrap();
    let d = db.read().unwrap();
    assert_eq!(d.collection(PEDIDOS).len(), 3);
    assert_eq!(d.collection(DETALLES_PEDIDO).len(), 1);
}

#[test]
fn test_corrupt_store_error_is_not_hidden() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("db.json");
    std::fs::write(&path, "{\"pedidos\": 5}").unwrap();
    let db = DatabaseCore::new(FileStorage::new(&path));

    let err = db.write(Document::new(), Role::Admin).unwrap_err();
    assert!(err.is_retryable(), "{:?}", err);
    let err = db.summarize_production("2024-05-01").unwrap_err();
    assert!(err.is_retryable(), "{:?}", err);
    // The corrupt file is left for inspection
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "{\"pedidos\": 5}");
    assert_eq!(db.store().backend_name(), "file");
}

#[test]
fn test_duplicate_id_rejected_and_nothing_written() {
    let db = seeded();
    let before = db.store().raw();
    let mut d = db.read().unwrap();
    d.collection_mut(PEDIDOS)
        .push(json!({"id": 1, "estado": "copia"}).as_object().unwrap().clone());

    for role in [Role::Operador, Role::Admin] {
        match db.write(d.clone(), role) {
            Err(ComandaError::Validation(msg)) => assert!(msg.contains(PEDIDOS), "{}", msg),
            other => panic!("expected duplicate id rejection, got {:?}", other),
        }
    }
    assert_eq!(db.store().raw(), before);

    let patch = doc(json!({"detallesPedido": [{"id": 4}, {"id": 4}]}));
    assert!(matches!(
        db.write_partial(patch, Role::Admin),
        Err(ComandaError::Validation(_))
    ));
}
