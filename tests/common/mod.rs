#![allow(dead_code)]

use std::sync::Arc;

use parking_lot::Mutex;
use sqlforge::prelude::*;

type Responder = dyn Fn(&Statement) -> QueryResult<Vec<Row>> + Send + Sync;

/// In-memory connection that records every statement and answers through a
/// responder closure.
pub struct RecordingConnection {
    driver: String,
    statements: Mutex<Vec<Statement>>,
    responder: Box<Responder>,
}

impl RecordingConnection {
    pub fn new(driver: &str) -> Self {
        Self::responding(driver, |_| Ok(Vec::new()))
    }

    pub fn with_rows(driver: &str, rows: Vec<Row>) -> Self {
        Self::responding(driver, move |_| Ok(rows.clone()))
    }

    pub fn responding<F>(driver: &str, responder: F) -> Self
    where
        F: Fn(&Statement) -> QueryResult<Vec<Row>> + Send + Sync + 'static,
    {
        Self {
            driver: driver.to_string(),
            statements: Mutex::new(Vec::new()),
            responder: Box::new(responder),
        }
    }

    pub fn statements(&self) -> Vec<Statement> {
        self.statements.lock().clone()
    }

    pub fn sql(&self) -> Vec<String> {
        self.statements.lock().iter().map(|s| s.sql.clone()).collect()
    }

    pub fn executed(&self) -> usize {
        self.statements.lock().len()
    }
}

impl Connection for RecordingConnection {
    fn driver(&self) -> &str {
        &self.driver
    }

    fn query(&self, statement: &Statement) -> QueryResult<Vec<Row>> {
        self.statements.lock().push(statement.clone());
        (self.responder)(statement)
    }
}

/// Records `(entity, row)` pairs handed to the change tracker.
#[derive(Default)]
pub struct RecordingTracker {
    pub tracked: Mutex<Vec<(String, Row)>>,
}

impl ChangeTracker for RecordingTracker {
    fn track(&self, entity: &str, row: &Row) {
        self.tracked.lock().push((entity.to_string(), row.clone()));
    }
}

impl RecordingTracker {
    pub fn entities(&self) -> Vec<String> {
        self.tracked.lock().iter().map(|(e, _)| e.clone()).collect()
    }
}

pub fn row(value: serde_json::Value) -> Row {
    serde_json::from_value(value).expect("row literal must be a JSON object")
}

/// A context over a shared recording connection, returned alongside it.
pub fn context(conn: RecordingConnection) -> (DbContext, Arc<RecordingConnection>) {
    let conn = Arc::new(conn);
    let ctx = DbContext::new(conn.clone());
    (ctx, conn)
}
