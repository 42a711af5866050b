// src/aggregation.rs
// Production summary: orders joined with their lines, grouped by product

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

use crate::collections::{DETALLES_PEDIDO, PEDIDOS};
use crate::document::{record_id, Document, Record};
use crate::error::{ComandaError, Result};
use crate::value_utils::{as_id, as_number, compare_locale, number_value};

/// Status value marking a cancelled order
pub const CANCELLED: &str = "cancelado";

// ============================================================================
// OUTPUT TYPES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductTotal {
    pub producto_id: Value,
    pub producto_nombre: String,
    pub cantidad_total: f64,
    pub subtotal_total: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub total_pedidos: usize,
    pub total_productos: usize,
    pub total_unidades: f64,
    pub total_monto: f64,
}

/// One selected order with its own, ungrouped lines
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderBreakdown {
    pub pedido_id: i64,
    pub casino_id: Value,
    pub empresa_id: Value,
    pub estado: Value,
    pub total: Value,
    pub detalles: Vec<Record>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductionSummary {
    pub fecha: String,
    pub per_product: Vec<ProductTotal>,
    pub totals: Totals,
    pub per_customer_breakdown: Vec<OrderBreakdown>,
}

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Validate the requested date and return it in canonical `YYYY-MM-DD` form
pub fn parse_date(date: &str) -> Result<String> {
    let date = date.trim();
    if date.is_empty() {
        return Err(ComandaError::Validation("date parameter is required".to_string()));
    }
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map(|d| d.format("%Y-%m-%d").to_string())
        .map_err(|_| ComandaError::Validation(format!("invalid date '{}', expected YYYY-MM-DD", date)))
}

/// Whether an order's `fechaEntrega` falls on `date`.
///
/// Stored values may carry a time part (`2024-05-01T10:00:00`); only the
/// date prefix is compared.
fn delivered_on(order: &Record, date: &str) -> bool {
    order
        .get("fechaEntrega")
        .and_then(Value::as_str)
        .map(|fecha| fecha.trim().get(..10) == Some(date))
        .unwrap_or(false)
}

fn is_cancelled(order: &Record) -> bool {
    order
        .get("estado")
        .and_then(Value::as_str)
        .map(|estado| estado.trim().eq_ignore_ascii_case(CANCELLED))
        .unwrap_or(false)
}

fn field(record: &Record, name: &str) -> Value {
    record.get(name).cloned().unwrap_or(Value::Null)
}

/// Grouping key for a product id: ids are compared by their integer value
/// when they have one ("10" and 10 are the same product).
fn product_key(line: &Record) -> String {
    match line.get("productoId") {
        Some(value) => match as_id(value) {
            Some(id) => format!("i:{}", id),
            None => format!("v:{}", value),
        },
        None => "v:null".to_string(),
    }
}

// ============================================================================
// SUMMARY
// ============================================================================

/// Compute the production summary for one delivery date.
///
/// Reads only `pedidos` and `detallesPedido`. Lines whose parent order is
/// missing, cancelled, or delivered on another date are left out of every
/// figure. Orders without an id cannot own lines and are not counted.
pub fn summarize_production(doc: &Document, date: &str) -> Result<ProductionSummary> {
    let fecha = parse_date(date)?;

    let orders: Vec<&Record> = doc
        .collection(PEDIDOS)
        .iter()
        .filter(|order| delivered_on(order, &fecha) && !is_cancelled(order))
        .filter(|order| record_id(order).is_some())
        .collect();
    let order_ids: HashSet<i64> = orders.iter().filter_map(|o| record_id(o)).collect();

    let mut lines_by_order: HashMap<i64, Vec<&Record>> = HashMap::new();
    for line in doc.collection(DETALLES_PEDIDO) {
        if let Some(pedido_id) = line.get("pedidoId").and_then(as_id) {
            if order_ids.contains(&pedido_id) {
                lines_by_order.entry(pedido_id).or_default().push(line);
            }
        }
    }

    // Group in line order so the first-seen name of a product wins
    let mut groups: Vec<ProductTotal> = Vec::new();
    let mut group_index: HashMap<String, usize> = HashMap::new();
    for line in doc.collection(DETALLES_PEDIDO) {
        let selected = line
            .get("pedidoId")
            .and_then(as_id)
            .map_or(false, |id| order_ids.contains(&id));
        if !selected {
            continue;
        }

        let key = product_key(line);
        let index = *group_index.entry(key).or_insert_with(|| {
            groups.push(ProductTotal {
                producto_id: field(line, "productoId"),
                producto_nombre: line
                    .get("productoNombre")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                cantidad_total: 0.0,
                subtotal_total: 0.0,
            });
            groups.len() - 1
        });
        let group = &mut groups[index];
        group.cantidad_total += as_number(line.get("cantidad"));
        group.subtotal_total += as_number(line.get("subtotal"));
    }

    groups.sort_by(|a, b| compare_locale(&a.producto_nombre, &b.producto_nombre));

    let totals = Totals {
        total_pedidos: orders.len(),
        total_productos: groups.len(),
        total_unidades: groups.iter().map(|g| g.cantidad_total).sum(),
        total_monto: groups.iter().map(|g| g.subtotal_total).sum(),
    };

    let per_customer_breakdown = orders
        .iter()
        .filter_map(|order| {
            let pedido_id = record_id(order)?;
            let detalles = lines_by_order
                .get(&pedido_id)
                .map(|lines| lines.iter().map(|l| (*l).clone()).collect())
                .unwrap_or_default();
            Some(OrderBreakdown {
                pedido_id,
                casino_id: field(order, "casinoId"),
                empresa_id: field(order, "empresaId"),
                estado: field(order, "estado"),
                total: field(order, "total"),
                detalles,
            })
        })
        .collect();

    Ok(ProductionSummary {
        fecha,
        per_product: groups,
        totals,
        per_customer_breakdown,
    })
}

impl ProductionSummary {
    /// JSON rendering with integral amounts printed without a fraction
    pub fn to_value(&self) -> Value {
        let per_product: Vec<Value> = self
            .per_product
            .iter()
            .map(|p| {
                serde_json::json!({
                    "productoId": p.producto_id,
                    "productoNombre": p.producto_nombre,
                    "cantidadTotal": number_value(p.cantidad_total),
                    "subtotalTotal": number_value(p.subtotal_total),
                })
            })
            .collect();
        serde_json::json!({
            "fecha": self.fecha,
            "perProduct": per_product,
            "totals": {
                "totalPedidos": self.totals.total_pedidos,
                "totalProductos": self.totals.total_productos,
                "totalUnidades": number_value(self.totals.total_unidades),
                "totalMonto": number_value(self.totals.total_monto),
            },
            "perCustomerBreakdown": self.per_customer_breakdown,
        })
    }
}
