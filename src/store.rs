//! Relational store facade (C6): a thin contract over an embedded SQL engine --
//! create-if-absent, parameterized insert, table-exists check, dump-as-XML (spec §4.5).
//!
//! The engine is `rusqlite` (bundled SQLite). A single `rusqlite::Connection` sits
//! behind a `parking_lot::Mutex`, held for the duration of every call -- "the engine is
//! used as a single-writer store" (spec §4.5) is therefore a property of this one lock,
//! not of anything SQLite does on its own.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::Connection;

use crate::error::{DbError, Result};

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Opens (or creates) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| DbError::Store(format!("Can't open database: {e}")))?;
        Ok(Store {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store, used by tests.
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Store {
            conn: Mutex::new(conn),
        })
    }

    pub fn table_exists(&self, name: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master WHERE type='table' AND name=?1",
        )?;
        Ok(stmt.exists([name])?)
    }

    /// Issues `CREATE TABLE IF NOT EXISTS` following the schema rules of spec §3: the
    /// main table gets `uuid TEXT PRIMARY KEY NOT NULL`; every other table gets a
    /// nullable `uuid TEXT` with a foreign key back to `main_table`.
    pub fn create_table(
        &self,
        name: &str,
        properties: &[String],
        is_main_table: bool,
        main_table: &str,
    ) -> Result<()> {
        let query = build_create_query(name, properties, is_main_table, main_table);
        let conn = self.conn.lock();
        conn.execute_batch(&query)
            .map_err(|e| DbError::Store(format!("Error creating table: {e}")))?;
        Ok(())
    }

    /// `INSERT INTO table (uuid, names...) VALUES (?, ?, ...)`, `uuid` bound first.
    pub fn insert(
        &self,
        uuid: &str,
        names: &[String],
        values: &[String],
        table: &str,
    ) -> Result<()> {
        let query = build_insert_query(names, table);
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&query)
            .map_err(|e| DbError::Store(format!("Error in insert in to table: {e}")))?;

        let mut params: Vec<&dyn rusqlite::ToSql> = Vec::with_capacity(values.len() + 1);
        params.push(&uuid);
        for v in values {
            params.push(v);
        }

        stmt.execute(params.as_slice())
            .map_err(|e| DbError::Store(format!("Error executing insert: {e}")))?;
        Ok(())
    }

    /// `"<name>\n    <col>val</col>...\n</name>\n"` for every row; `NULL` for null
    /// columns; `"<name />\n"` if the table has zero columns.
    pub fn dump_table(&self, name: &str) -> Result<String> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!("SELECT * FROM {name}"))
            .map_err(|e| DbError::Store(format!("Error preparing select query: {e}")))?;

        let column_count = stmt.column_count();
        if column_count < 1 {
            return Ok(format!("<{name} />\n"));
        }

        let column_names: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(|c| c.to_string())
            .collect();

        let mut out = format!("<{name}>\n");
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            for (i, col) in column_names.iter().enumerate() {
                let value: Option<String> = row.get(i)?;
                let value = value.as_deref().unwrap_or("NULL");
                out.push_str(&format!("    <{col}>{value}</{col}>\n"));
            }
        }
        out.push_str(&format!("</{name}>\n"));
        Ok(out)
    }

    /// `"<database>\n"` + `dump_table` of every table in the catalog + `"</database>\n"`.
    pub fn dump_all(&self) -> Result<String> {
        let table_names = self.all_table_names()?;
        let mut out = String::from("<database>\n");
        for table in table_names {
            out.push_str(&self.dump_table(&table)?);
        }
        out.push_str("</database>\n");
        Ok(out)
    }

    fn all_table_names(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table'")
            .map_err(|e| DbError::Store(format!("Error fetching table names: {e}")))?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(names)
    }
}

fn build_create_query(name: &str, properties: &[String], is_main_table: bool, main_table: &str) -> String {
    let mut query = format!("CREATE TABLE IF NOT EXISTS {name} (");

    if is_main_table {
        query.push_str("uuid TEXT PRIMARY KEY NOT NULL ");
        for property in properties {
            query.push_str(&format!(" , {property} TEXT NOT NULL  "));
        }
        query.push_str(");");
    } else {
        for property in properties {
            query.push_str(&format!("{property} TEXT NOT NULL , "));
        }
        query.push_str(&format!(
            "uuid TEXT ,FOREIGN KEY (uuid) REFERENCES {main_table} (uuid));"
        ));
    }
    query
}

fn build_insert_query(names: &[String], table: &str) -> String {
    let mut query = format!("INSERT INTO {table} (uuid");
    for name in names {
        query.push_str(&format!(", {name}"));
    }
    query.push_str(") VALUES (? ");
    for _ in names {
        query.push_str(",?");
    }
    query.push_str(");");
    query
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn creates_main_table_with_uuid_primary_key() {
        let store = Store::open_in_memory().unwrap();
        store
            .create_table("person", &names(&["name"]), true, "person")
            .unwrap();
        assert!(store.table_exists("person").unwrap());
        assert!(!store.table_exists("nonexistent").unwrap());
    }

    #[test]
    fn insert_then_dump_round_trips() {
        let store = Store::open_in_memory().unwrap();
        store
            .create_table("person", &names(&["name"]), true, "person")
            .unwrap();
        store
            .insert("u1", &names(&["name"]), &names(&["alice"]), "person")
            .unwrap();

        let xml = store.dump_table("person").unwrap();
        assert!(xml.contains("<uuid>u1</uuid>"));
        assert!(xml.contains("<name>alice</name>"));
    }

    #[test]
    fn duplicate_primary_key_insert_fails() {
        let store = Store::open_in_memory().unwrap();
        store
            .create_table("person", &names(&["name"]), true, "person")
            .unwrap();
        store
            .insert("u1", &names(&["name"]), &names(&["alice"]), "person")
            .unwrap();

        let err = store.insert("u1", &names(&["name"]), &names(&["bob"]), "person");
        assert!(err.is_err());
    }

    #[test]
    fn dump_all_wraps_in_database_tag() {
        let store = Store::open_in_memory().unwrap();
        store
            .create_table("person", &names(&["name"]), true, "person")
            .unwrap();
        store
            .insert("u1", &names(&["name"]), &names(&["alice"]), "person")
            .unwrap();

        let xml = store.dump_all().unwrap();
        assert!(xml.starts_with("<database>\n"));
        assert!(xml.trim_end().ends_with("</database>"));
        assert!(xml.contains("<person>"));
    }

    #[test]
    fn non_main_table_has_nullable_foreign_key_column() {
        let store = Store::open_in_memory().unwrap();
        store
            .create_table("order", &names(&["total"]), true, "order")
            .unwrap();
        store
            .create_table("line", &names(&["sku", "qty"]), false, "order")
            .unwrap();
        store
            .insert("u2", &names(&["sku", "qty"]), &names(&["s1", "2"]), "line")
            .unwrap();

        let xml = store.dump_table("line").unwrap();
        assert!(xml.contains("<sku>s1</sku>"));
        assert!(xml.contains("<qty>2</qty>"));
    }
}
