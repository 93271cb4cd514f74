//! In-memory book and catalog tables for one catalog instance.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::model::{Book, Catalog, NewBook};
use crate::error::ServiceError;

#[derive(Default)]
struct Tables {
    books: BTreeMap<u64, Book>,
    catalogs: BTreeMap<u64, Catalog>,
    last_book_id: u64,
    last_catalog_id: u64,
}

/// Book and catalog storage.
///
/// Every stock mutation happens under the write lock, so
/// [`decrement_if_positive`](CatalogStore::decrement_if_positive) is a single
/// atomic check-and-act: concurrent purchasers can never drive a count
/// below zero.
#[derive(Default)]
pub struct CatalogStore {
    tables: RwLock<Tables>,
}

impl CatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self, op: &'static str) -> Result<RwLockReadGuard<'_, Tables>, ServiceError> {
        self.tables.read().map_err(|_| ServiceError::poisoned(op))
    }

    fn write(&self, op: &'static str) -> Result<RwLockWriteGuard<'_, Tables>, ServiceError> {
        self.tables.write().map_err(|_| ServiceError::poisoned(op))
    }

    pub fn create_catalog(&self, name: String) -> Result<Catalog, ServiceError> {
        let mut tables = self.write("create_catalog")?;
        tables.last_catalog_id += 1;
        let catalog = Catalog {
            id: tables.last_catalog_id,
            name,
        };
        tables.catalogs.insert(catalog.id, catalog.clone());
        Ok(catalog)
    }

    pub fn catalogs(&self) -> Result<Vec<Catalog>, ServiceError> {
        Ok(self.read("catalogs")?.catalogs.values().cloned().collect())
    }

    pub fn catalog(&self, id: u64) -> Result<Option<Catalog>, ServiceError> {
        Ok(self.read("catalog")?.catalogs.get(&id).cloned())
    }

    pub fn create_book(&self, new: NewBook) -> Result<Book, ServiceError> {
        let mut tables = self.write("create_book")?;
        tables.last_book_id += 1;
        let book = Book {
            id: tables.last_book_id,
            name: new.name,
            count: new.count,
            price: new.price,
            catalog: new.catalog,
        };
        tables.books.insert(book.id, book.clone());
        Ok(book)
    }

    /// Insert a book under its own id unless that id is already taken.
    /// Returns whether the book was inserted. Later `create_book` calls
    /// allocate ids above every inserted id.
    pub fn insert_if_absent(&self, book: Book) -> Result<bool, ServiceError> {
        let mut tables = self.write("insert_if_absent")?;
        if tables.books.contains_key(&book.id) {
            return Ok(false);
        }
        tables.last_book_id = tables.last_book_id.max(book.id);
        tables.books.insert(book.id, book);
        Ok(true)
    }

    /// Every book, ordered by id.
    pub fn books(&self) -> Result<Vec<Book>, ServiceError> {
        Ok(self.read("books")?.books.values().cloned().collect())
    }

    pub fn book(&self, id: u64) -> Result<Book, ServiceError> {
        self.read("book")?
            .books
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found(id))
    }

    /// Books whose name equals `name` exactly.
    pub fn search_exact(&self, name: &str) -> Result<Vec<Book>, ServiceError> {
        Ok(self
            .read("search_exact")?
            .books
            .values()
            .filter(|b| b.name == name)
            .cloned()
            .collect())
    }

    /// Books whose name contains `fragment`.
    pub fn find_containing(&self, fragment: &str) -> Result<Vec<Book>, ServiceError> {
        Ok(self
            .read("find_containing")?
            .books
            .values()
            .filter(|b| b.name.contains(fragment))
            .cloned()
            .collect())
    }

    /// Decrement the count by one only if it is positive.
    pub fn decrement_if_positive(&self, id: u64) -> Result<Book, ServiceError> {
        let mut tables = self.write("decrement_if_positive")?;
        let book = tables.books.get_mut(&id).ok_or_else(|| not_found(id))?;
        if book.count == 0 {
            return Err(ServiceError::OutOfStock(id));
        }
        book.count -= 1;
        Ok(book.clone())
    }

    pub fn increment(&self, id: u64) -> Result<Book, ServiceError> {
        let mut tables = self.write("increment")?;
        let book = tables.books.get_mut(&id).ok_or_else(|| not_found(id))?;
        book.count = book.count.saturating_add(1);
        Ok(book.clone())
    }

    pub fn set_price(&self, id: u64, price: f64) -> Result<Book, ServiceError> {
        let mut tables = self.write("set_price")?;
        let book = tables.books.get_mut(&id).ok_or_else(|| not_found(id))?;
        book.price = price;
        Ok(book.clone())
    }

    pub fn book_count(&self) -> Result<usize, ServiceError> {
        Ok(self.read("book_count")?.books.len())
    }
}

fn not_found(id: u64) -> ServiceError {
    ServiceError::NotFound(format!("book {}", id))
}
