use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::ServiceError;

/// A grouping of books.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub id: u64,
    pub name: String,
}

impl Catalog {
    pub fn to_json(&self) -> Value {
        json!({ "id": self.id, "name": self.name })
    }
}

/// A book as stored by one catalog instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub id: u64,
    pub name: String,
    pub count: u32,
    pub price: f64,
    /// Owning catalog id.
    pub catalog: u64,
}

impl Book {
    /// Full projection, used by `GET /books/{id}`, listings and change events.
    pub fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "name": self.name,
            "count": self.count,
            "price": self.price,
            "catalog": self.catalog,
        })
    }

    /// Projection returned by exact-name search.
    pub fn search_hit(&self) -> Value {
        json!({ "name": self.name, "price": self.price, "id": self.id })
    }

    /// Projection returned by substring find.
    pub fn find_hit(&self) -> Value {
        json!({ "id": self.id, "name": self.name, "count": self.count })
    }
}

/// Validated input for creating a book.
#[derive(Debug, Clone, PartialEq)]
pub struct NewBook {
    pub name: String,
    pub catalog: u64,
    pub count: u32,
    pub price: f64,
}

/// Raw `POST /books` form. Every field is optional so that a missing field
/// is reported as `InvalidInput` instead of a transport rejection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookForm {
    pub name: Option<String>,
    pub catalog: Option<String>,
    pub count: Option<String>,
    pub price: Option<String>,
}

impl BookForm {
    pub fn validate(self) -> Result<NewBook, ServiceError> {
        let name = required("name", self.name)?;
        let catalog = required("catalog", self.catalog)?;
        let catalog = catalog
            .trim()
            .parse::<u64>()
            .map_err(|_| ServiceError::InvalidInput(format!("catalog {:?} is not an id", catalog)))?;
        let count = required("count", self.count)?;
        let count = count
            .trim()
            .parse::<i64>()
            .map_err(|_| ServiceError::InvalidInput(format!("count {:?} is not an integer", count)))?;
        if count < 0 {
            return Err(ServiceError::InvalidInput("count must not be negative".into()));
        }
        let count = u32::try_from(count)
            .map_err(|_| ServiceError::InvalidInput("count is too large".into()))?;
        let price = parse_price(&required("price", self.price)?)?;

        Ok(NewBook {
            name,
            catalog,
            count,
            price,
        })
    }
}

/// Raw `POST /catalogs` form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogForm {
    pub name: Option<String>,
}

impl CatalogForm {
    pub fn validate(self) -> Result<String, ServiceError> {
        required("name", self.name)
    }
}

/// Raw `PUT /books/{id}/price` form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PriceForm {
    pub price: Option<String>,
}

impl PriceForm {
    pub fn validate(self) -> Result<f64, ServiceError> {
        parse_price(&required("price", self.price)?)
    }
}

fn required(field: &str, value: Option<String>) -> Result<String, ServiceError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ServiceError::InvalidInput(format!("no {} was provided", field))),
    }
}

fn parse_price(raw: &str) -> Result<f64, ServiceError> {
    let price = raw
        .trim()
        .parse::<f64>()
        .map_err(|_| ServiceError::InvalidInput(format!("price {:?} is not a number", raw)))?;
    if !price.is_finite() || price < 0.0 {
        return Err(ServiceError::InvalidInput(
            "price must be a non-negative number".into(),
        ));
    }
    Ok(price)
}
