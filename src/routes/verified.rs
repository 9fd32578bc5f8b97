use crate::{
    guard::{Capability, ResourceActions, RouteTable, handler},
    handlers,
};
use axum::http::Method;

/// Verified Router Module
///
/// Every route here requires the full capability set: a valid session whose
/// principal has completed email verification. `Capability::Verified` implies
/// `Capability::Authenticated`, so the single marker is the whole contract.
///
/// The resource registrations expand to the conventional seven actions each,
/// with `/create` registered ahead of `/{id}` — first-match-wins precedence
/// is what keeps the literal path reachable.
pub fn register(table: RouteTable) -> RouteTable {
    const CAPS: &[Capability] = &[Capability::Verified];
    table
        // GET /home
        // The signed-in dashboard.
        .route(Method::GET, "/home", CAPS, handler(handlers::home))
        // GET /categories/{category}
        // Products for one category, addressed by slug.
        .route(
            Method::GET,
            "/categories/{category}",
            CAPS,
            handler(handlers::category_index),
        )
        // Full resource set for products.
        .resource(
            "/products",
            CAPS,
            ResourceActions {
                index: handler(handlers::product_index),
                create: handler(handlers::product_create),
                store: handler(handlers::product_store),
                show: handler(handlers::product_show),
                edit: handler(handlers::product_edit),
                update: handler(handlers::product_update),
                destroy: handler(handlers::product_destroy),
            },
        )
        // Full resource set for the per-user product entries.
        .resource(
            "/product-users",
            CAPS,
            ResourceActions {
                index: handler(handlers::product_user_index),
                create: handler(handlers::product_user_create),
                store: handler(handlers::product_user_store),
                show: handler(handlers::product_user_show),
                edit: handler(handlers::product_user_edit),
                update: handler(handlers::product_user_update),
                destroy: handler(handlers::product_user_destroy),
            },
        )
}
