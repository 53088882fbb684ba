//! Product catalog: the second resource behind the access controller.
//!
//! Every role may read the catalog, `user` and `admin` may add and change
//! entries, and only `admin` may remove them. The route groups in
//! [`crate::api::app`] carry those role sets.

pub mod product;
pub mod repo;
pub mod service;
pub mod storage;

pub use product::{NewProduct, Product, ProductChanges, ProductLookup, ProductUpdate};
pub use repo::{InMemoryProductRepository, ProductRepository};
pub use service::ProductService;
pub use storage::PgProductRepository;
