//! Catalog records and the shapes clients send for them.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// A catalog entry. `price` is in minor currency units.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub price: i64,
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct NewProduct {
    pub name: String,
    pub price: i64,
}

/// Either key identifies a product. `prodname` is accepted for `name`.
#[derive(Clone, Debug, Default, Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ProductLookup {
    pub id: Option<i64>,
    #[serde(alias = "prodname")]
    pub name: Option<String>,
}

/// Body of an update. The id may come from the query string instead.
#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct ProductChanges {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub price: Option<i64>,
}

/// Partial update of one stored product. `None` leaves a field untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProductUpdate {
    pub id: i64,
    pub name: Option<String>,
    pub price: Option<i64>,
}

impl ProductUpdate {
    #[must_use]
    pub fn new(id: i64) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    pub(crate) fn apply(&self, product: &mut Product) {
        if let Some(name) = &self.name {
            product.name.clone_from(name);
        }
        if let Some(price) = self.price {
            product.price = price;
        }
    }
}
