//! Result Stores
//!
//! Destinations for detail and summary rows. Each store declares its
//! columns (key to human label) once, before any row is added.

use std::collections::HashMap;
use std::io::Write;

use serde_json::{json, Value};

use crate::AuditError;

/// Column schema of a store
#[derive(Debug, Clone, PartialEq)]
pub struct StoreSchema {
    pub name: String,
    pub columns: Vec<(&'static str, &'static str)>,
}

impl StoreSchema {
    /// Schema of the per-context summary store
    pub fn summary(name: &str) -> Self {
        Self {
            name: name.to_string(),
            columns: vec![
                ("url", "Url"),
                ("context", "Context"),
                ("nb", "NB requests"),
                ("ratioCacheControle", "Cache Controle (%)"),
                ("ratioHttp2", "Http 2 (%)"),
                ("secure", "HTTPS (%)"),
                ("badEncoded", "Nb requests encoded > decoded"),
                ("encoded", "Encoded requests (%)"),
            ],
        }
    }

    /// Schema of the per-resource detail store
    pub fn detail(name: &str) -> Self {
        Self {
            name: name.to_string(),
            columns: vec![
                ("url", "Url"),
                ("context", "Context"),
                ("src", "Source"),
                ("mimeType", "Mime type"),
                ("contentEncoding", "Content Encoding"),
                ("responseHeaderSize", "Response Header Size"),
                ("encodedDataLength", "Encoded Data Length"),
                ("decodedDataLength", "Decoded Data Length"),
                ("fromCache", "From Cache"),
                ("cacheControl", "Cache Control"),
                ("protocol", "Protocol"),
                ("securityState", "Security State"),
                ("securityProtocole", "Security Protocole"),
            ],
        }
    }

    pub fn label(&self, key: &str) -> Option<&'static str> {
        self.columns.iter().find(|(k, _)| *k == key).map(|(_, label)| *label)
    }
}

/// Storage collaborator receiving result rows
pub trait ResultSink {
    /// Declare a store and its columns
    fn install_store(&mut self, schema: &StoreSchema) -> Result<(), AuditError>;

    /// Append one row to a store
    fn add(&mut self, store: &str, row: Value) -> Result<(), AuditError>;
}

/// In-memory sink
#[derive(Debug, Default)]
pub struct MemorySink {
    schemas: HashMap<String, StoreSchema>,
    rows: HashMap<String, Vec<Value>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schema(&self, store: &str) -> Option<&StoreSchema> {
        self.schemas.get(store)
    }

    pub fn rows(&self, store: &str) -> &[Value] {
        self.rows.get(store).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Drop all rows; installed stores stay installed
    pub fn clear(&mut self) {
        self.rows.values_mut().for_each(Vec::clear);
    }
}

impl ResultSink for MemorySink {
    fn install_store(&mut self, schema: &StoreSchema) -> Result<(), AuditError> {
        self.schemas.insert(schema.name.clone(), schema.clone());
        self.rows.entry(schema.name.clone()).or_default();
        Ok(())
    }

    fn add(&mut self, store: &str, row: Value) -> Result<(), AuditError> {
        match self.rows.get_mut(store) {
            Some(rows) => {
                rows.push(row);
                Ok(())
            }
            None => Err(AuditError::Sink(format!("store not installed: {}", store))),
        }
    }
}

/// Writes each schema and row as one JSON line
#[derive(Debug)]
pub struct JsonLinesSink<W: Write> {
    writer: W,
    stores: Vec<String>,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, stores: Vec::new() }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_line(&mut self, value: &Value) -> Result<(), AuditError> {
        serde_json::to_writer(&mut self.writer, value)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }
}

impl<W: Write> ResultSink for JsonLinesSink<W> {
    fn install_store(&mut self, schema: &StoreSchema) -> Result<(), AuditError> {
        let columns: serde_json::Map<String, Value> = schema.columns.iter()
            .map(|(key, label)| (key.to_string(), Value::from(*label)))
            .collect();
        self.write_line(&json!({ "store": schema.name, "columns": columns }))?;
        self.stores.push(schema.name.clone());
        Ok(())
    }

    fn add(&mut self, store: &str, row: Value) -> Result<(), AuditError> {
        if !self.stores.iter().any(|s| s == store) {
            return Err(AuditError::Sink(format!("store not installed: {}", store)));
        }
        self.write_line(&json!({ "store": store, "row": row }))?;
        self.writer.flush()?;
        Ok(())
    }
}
