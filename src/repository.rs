use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{Category, Product, ProductRequest, ProductUser, ProductUserRequest, User};

/// Repository Trait
///
/// Defines the abstract contract for all persistence operations. Handlers talk
/// to this trait object and never to a concrete backend, which keeps the
/// resource controllers pure CRUD glue and lets tests swap the store freely.
///
/// Send + Sync + async_trait are required to make `Arc<dyn Repository>` safely
/// shareable across axum's asynchronous task boundaries.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users / Auth ---
    // Returns None when the email is already taken.
    async fn create_user(&self, user: User) -> Option<User>;
    async fn get_user(&self, id: Uuid) -> Option<User>;
    async fn find_user_by_email(&self, email: &str) -> Option<User>;
    // Consumes the verification token; returns false when it does not match.
    async fn verify_user(&self, id: Uuid, token: Uuid) -> bool;
    // Re-issues the verification token for an unverified user.
    async fn set_verification_token(&self, id: Uuid, token: Uuid) -> bool;
    // Attaches a password-reset token to the account with this email.
    async fn set_password_reset_token(&self, email: &str, token: Uuid) -> bool;
    // Consumes the reset token and replaces the digest; false on mismatch.
    async fn reset_password(&self, email: &str, token: Uuid, digest: String) -> bool;

    // --- Categories ---
    async fn list_categories(&self) -> Vec<Category>;
    async fn find_category_by_slug(&self, slug: &str) -> Option<Category>;

    // --- Products ---
    async fn list_products(&self) -> Vec<Product>;
    async fn products_in_category(&self, category_id: Uuid) -> Vec<Product>;
    async fn create_product(&self, product: Product) -> Product;
    async fn get_product(&self, id: Uuid) -> Option<Product>;
    // Partial update: absent fields keep their current value.
    async fn update_product(&self, id: Uuid, req: ProductRequest) -> Option<Product>;
    async fn delete_product(&self, id: Uuid) -> bool;

    // --- Product/User entries (always scoped to the owning user) ---
    async fn list_product_users(&self, user_id: Uuid) -> Vec<ProductUser>;
    async fn create_product_user(&self, entry: ProductUser) -> ProductUser;
    async fn get_product_user(&self, id: Uuid, user_id: Uuid) -> Option<ProductUser>;
    async fn update_product_user(
        &self,
        id: Uuid,
        user_id: Uuid,
        req: ProductUserRequest,
    ) -> Option<ProductUser>;
    async fn delete_product_user(&self, id: Uuid, user_id: Uuid) -> bool;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

// --- Password digests ---

/// Produces a salted SHA-256 digest in `salt$hex` form. The salt is minted per
/// user at registration so identical passwords never share a digest.
pub fn digest_password(password: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    format!("{}${:x}", salt, hasher.finalize())
}

/// Checks a candidate password against a stored `salt$hex` digest.
pub fn verify_password(password: &str, stored: &str) -> bool {
    match stored.split_once('$') {
        Some((salt, _)) => digest_password(password, salt) == stored,
        None => false,
    }
}

// --- In-memory backend ---

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    categories: Vec<Category>,
    products: HashMap<Uuid, Product>,
    product_users: HashMap<Uuid, ProductUser>,
}

/// InMemoryRepository
///
/// The concrete implementation of `Repository`, backed by guarded maps. This is
/// the whole persistence story for the portal; nothing here talks to an
/// external database.
#[derive(Default)]
pub struct InMemoryRepository {
    tables: RwLock<Tables>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a couple of categories and products so a freshly started portal
    /// has something to render. Used by the binary entry point, not by tests.
    pub async fn with_demo_data() -> Self {
        let repo = Self::new();
        {
            let mut tables = repo.tables.write().await;
            let now = Utc::now();
            for (name, slug) in [("Groceries", "groceries"), ("Household", "household")] {
                let category = Category {
                    id: Uuid::new_v4(),
                    name: name.to_string(),
                    slug: slug.to_string(),
                };
                for (product_name, price_cents) in [("Starter item", 499), ("Second item", 1250)] {
                    let id = Uuid::new_v4();
                    tables.products.insert(
                        id,
                        Product {
                            id,
                            category_id: category.id,
                            name: format!("{} ({})", product_name, name),
                            description: None,
                            price_cents,
                            created_at: now,
                            updated_at: now,
                        },
                    );
                }
                tables.categories.push(category);
            }
        }
        repo
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn create_user(&self, user: User) -> Option<User> {
        let mut tables = self.tables.write().await;
        // Uniqueness check and insert under one write lock, so two concurrent
        // registrations for the same email cannot both succeed.
        if tables
            .users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(&user.email))
        {
            return None;
        }
        tables.users.insert(user.id, user.clone());
        Some(user)
    }

    async fn get_user(&self, id: Uuid) -> Option<User> {
        self.tables.read().await.users.get(&id).cloned()
    }

    async fn find_user_by_email(&self, email: &str) -> Option<User> {
        self.tables
            .read()
            .await
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned()
    }

    async fn verify_user(&self, id: Uuid, token: Uuid) -> bool {
        let mut tables = self.tables.write().await;
        match tables.users.get_mut(&id) {
            Some(user) if user.verification_token == Some(token) => {
                user.verified = true;
                user.verification_token = None;
                true
            }
            _ => false,
        }
    }

    async fn set_verification_token(&self, id: Uuid, token: Uuid) -> bool {
        let mut tables = self.tables.write().await;
        match tables.users.get_mut(&id) {
            Some(user) if !user.verified => {
                user.verification_token = Some(token);
                true
            }
            _ => false,
        }
    }

    async fn set_password_reset_token(&self, email: &str, token: Uuid) -> bool {
        let mut tables = self.tables.write().await;
        match tables
            .users
            .values_mut()
            .find(|u| u.email.eq_ignore_ascii_case(email))
        {
            Some(user) => {
                user.password_reset_token = Some(token);
                true
            }
            None => false,
        }
    }

    async fn reset_password(&self, email: &str, token: Uuid, digest: String) -> bool {
        let mut tables = self.tables.write().await;
        match tables
            .users
            .values_mut()
            .find(|u| u.email.eq_ignore_ascii_case(email))
        {
            Some(user) if user.password_reset_token == Some(token) => {
                user.password_digest = digest;
                user.password_reset_token = None;
                true
            }
            _ => false,
        }
    }

    async fn list_categories(&self) -> Vec<Category> {
        self.tables.read().await.categories.clone()
    }

    async fn find_category_by_slug(&self, slug: &str) -> Option<Category> {
        self.tables
            .read()
            .await
            .categories
            .iter()
            .find(|c| c.slug == slug)
            .cloned()
    }

    async fn list_products(&self) -> Vec<Product> {
        let mut products: Vec<Product> =
            self.tables.read().await.products.values().cloned().collect();
        products.sort_by_key(|p| p.created_at);
        products
    }

    async fn products_in_category(&self, category_id: Uuid) -> Vec<Product> {
        let mut products: Vec<Product> = self
            .tables
            .read()
            .await
            .products
            .values()
            .filter(|p| p.category_id == category_id)
            .cloned()
            .collect();
        products.sort_by_key(|p| p.created_at);
        products
    }

    async fn create_product(&self, product: Product) -> Product {
        self.tables
            .write()
            .await
            .products
            .insert(product.id, product.clone());
        product
    }

    async fn get_product(&self, id: Uuid) -> Option<Product> {
        self.tables.read().await.products.get(&id).cloned()
    }

    async fn update_product(&self, id: Uuid, req: ProductRequest) -> Option<Product> {
        let mut tables = self.tables.write().await;
        let product = tables.products.get_mut(&id)?;
        if let Some(category_id) = req.category_id {
            product.category_id = category_id;
        }
        if let Some(name) = req.name {
            product.name = name;
        }
        if req.description.is_some() {
            product.description = req.description;
        }
        if let Some(price_cents) = req.price_cents {
            product.price_cents = price_cents;
        }
        product.updated_at = Utc::now();
        Some(product.clone())
    }

    async fn delete_product(&self, id: Uuid) -> bool {
        self.tables.write().await.products.remove(&id).is_some()
    }

    async fn list_product_users(&self, user_id: Uuid) -> Vec<ProductUser> {
        let mut entries: Vec<ProductUser> = self
            .tables
            .read()
            .await
            .product_users
            .values()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.created_at);
        entries
    }

    async fn create_product_user(&self, entry: ProductUser) -> ProductUser {
        self.tables
            .write()
            .await
            .product_users
            .insert(entry.id, entry.clone());
        entry
    }

    async fn get_product_user(&self, id: Uuid, user_id: Uuid) -> Option<ProductUser> {
        self.tables
            .read()
            .await
            .product_users
            .get(&id)
            .filter(|e| e.user_id == user_id)
            .cloned()
    }

    async fn update_product_user(
        &self,
        id: Uuid,
        user_id: Uuid,
        req: ProductUserRequest,
    ) -> Option<ProductUser> {
        let mut tables = self.tables.write().await;
        let entry = tables.product_users.get_mut(&id)?;
        // Owner-only: a mismatched user affects zero rows, same as an unknown id.
        if entry.user_id != user_id {
            return None;
        }
        if let Some(product_id) = req.product_id {
            entry.product_id = product_id;
        }
        if let Some(quantity) = req.quantity {
            entry.quantity = quantity;
        }
        entry.updated_at = Utc::now();
        Some(entry.clone())
    }

    async fn delete_product_user(&self, id: Uuid, user_id: Uuid) -> bool {
        let mut tables = self.tables.write().await;
        match tables.product_users.get(&id) {
            Some(entry) if entry.user_id == user_id => {
                tables.product_users.remove(&id);
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_digest_round_trip() {
        let digest = digest_password("secret", "salt-a");
        assert!(verify_password("secret", &digest));
        assert!(!verify_password("wrong", &digest));
    }

    #[test]
    fn identical_passwords_get_distinct_digests() {
        let a = digest_password("secret", "salt-a");
        let b = digest_password("secret", "salt-b");
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let repo = InMemoryRepository::new();
        let mut user = User {
            id: Uuid::new_v4(),
            email: "dup@example.com".to_string(),
            ..Default::default()
        };
        assert!(repo.create_user(user.clone()).await.is_some());

        user.id = Uuid::new_v4();
        user.email = "DUP@example.com".to_string(); // case-insensitive match
        assert!(repo.create_user(user).await.is_none());
    }

    #[tokio::test]
    async fn product_user_rows_are_owner_scoped() {
        let repo = InMemoryRepository::new();
        let owner = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        let entry = repo
            .create_product_user(ProductUser {
                id: Uuid::new_v4(),
                user_id: owner,
                product_id: Uuid::new_v4(),
                quantity: 2,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .await;

        assert!(repo.get_product_user(entry.id, owner).await.is_some());
        assert!(repo.get_product_user(entry.id, stranger).await.is_none());
        assert!(!repo.delete_product_user(entry.id, stranger).await);
        assert!(repo.delete_product_user(entry.id, owner).await);
    }
}
