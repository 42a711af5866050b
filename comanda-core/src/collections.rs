// comanda-core/src/collections.rs
//! Collection registry
//!
//! The set of collections every document is expected to carry. Documents
//! written by older releases may lack some of them; readers patch them in as
//! empty collections instead of running a schema migration.

use crate::document::Document;

pub const USERS: &str = "users";
pub const EMPRESAS: &str = "empresas";
pub const CASINOS: &str = "casinos";
pub const PRODUCTOS: &str = "productos";
pub const PRECIOS: &str = "precios";
pub const PEDIDOS: &str = "pedidos";
pub const DETALLES_PEDIDO: &str = "detallesPedido";
pub const PAGOS: &str = "pagos";

/// Every collection a document must expose, in registration order.
pub const REQUIRED_COLLECTIONS: &[&str] = &[
    USERS,
    EMPRESAS,
    CASINOS,
    PRODUCTOS,
    PRECIOS,
    PEDIDOS,
    DETALLES_PEDIDO,
    PAGOS,
];

/// Canonical seed for a fresh store: every required collection, empty.
pub fn default_document() -> Document {
    REQUIRED_COLLECTIONS
        .iter()
        .map(|name| (name.to_string(), Vec::new()))
        .collect()
}

/// Required collections absent from `doc`.
pub fn missing_collections(doc: &Document) -> Vec<&'static str> {
    REQUIRED_COLLECTIONS
        .iter()
        .copied()
        .filter(|name| !doc.has_collection(name))
        .collect()
}

/// Add every missing required collection as an empty one.
///
/// Returns the names that were added; an empty result means `doc` was
/// already complete and does not need to be persisted again.
pub fn ensure_collections(doc: &mut Document) -> Vec<&'static str> {
    let missing = missing_collections(doc);
    for name in &missing {
        doc.set_collection(name, Vec::new());
    }
    missing
}
