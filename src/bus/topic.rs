//! Topic names shared by every service.

use crate::role::Role;

pub const CATALOG_CHANGE: &str = "catalog_change";
pub const CATALOG_CHANGE_REPLICA: &str = "catalog_change_replica";
pub const BOOK_CHANGE: &str = "book_change";
pub const BOOK_CHANGE_REPLICA: &str = "book_change_replica";
pub const ORDER_CONFIRMATION_ORIGINAL: &str = "order_confirmation_original";
pub const ORDER_CONFIRMATION_REPLICA: &str = "order_confirmation_replica";
pub const CACHE_INVALIDATE: &str = "cache_invalidate";

/// Catalog change topic published by an instance with the given role.
pub fn catalog_change(role: Role) -> &'static str {
    match role {
        Role::Primary => CATALOG_CHANGE,
        Role::Replica => CATALOG_CHANGE_REPLICA,
    }
}

/// Book change topic published by an instance with the given role.
pub fn book_change(role: Role) -> &'static str {
    match role {
        Role::Primary => BOOK_CHANGE,
        Role::Replica => BOOK_CHANGE_REPLICA,
    }
}

/// Order confirmation topic published by an order service with the given role.
pub fn order_confirmation(role: Role) -> &'static str {
    match role {
        Role::Primary => ORDER_CONFIRMATION_ORIGINAL,
        Role::Replica => ORDER_CONFIRMATION_REPLICA,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_topics() {
        assert_eq!(book_change(Role::Primary), "book_change");
        assert_eq!(book_change(Role::Replica), "book_change_replica");
        assert_eq!(catalog_change(Role::Replica), "catalog_change_replica");
        assert_eq!(order_confirmation(Role::Primary), "order_confirmation_original");
        assert_eq!(order_confirmation(Role::Replica), "order_confirmation_replica");
    }
}
