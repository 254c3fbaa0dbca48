//! SQLite implementation of [`GraphStore`].
//!
//! [`SqliteStore`] persists preference graphs in a SQLite database with WAL
//! mode and automatic schema migrations. Edge types are stored as a base kind
//! label plus a nullable topic column. Transactions map onto savepoints so
//! they nest.

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use delegraph_core::{Edge, EdgeId, EdgeKind, EdgeType, Flag, NodeId, NodeKind, TopicId};

use crate::error::StorageError;
use crate::traits::GraphStore;

/// SQLite-backed implementation of [`GraphStore`].
pub struct SqliteStore {
    conn: Connection,
    /// Number of currently open savepoints.
    depth: usize,
}

impl SqliteStore {
    /// Opens (or creates) a SQLite database at `path`.
    pub fn new(path: &str) -> Result<Self, StorageError> {
        let conn = crate::schema::open_database(path)?;
        Ok(SqliteStore { conn, depth: 0 })
    }

    /// Opens an in-memory SQLite database (for testing).
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = crate::schema::open_in_memory()?;
        Ok(SqliteStore { conn, depth: 0 })
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    /// Verifies a node exists, returning an error if not.
    fn assert_node_exists(&self, node: NodeId) -> Result<(), StorageError> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM nodes WHERE id = ?1)",
            params![node.0],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(StorageError::NodeNotFound(node));
        }
        Ok(())
    }

    /// Builds `(kind = ? AND topic IS ?) OR ...` for a type filter, with its
    /// bound values appended to `values`.
    fn type_filter(types: &[EdgeType], values: &mut Vec<Value>) -> String {
        let clauses: Vec<&str> = types
            .iter()
            .map(|ty| {
                values.push(Value::Text(ty.kind().label().to_string()));
                values.push(ty.topic().map_or(Value::Null, |t| Value::Integer(topic_to_sql(t))));
                "(kind = ? AND topic IS ?)"
            })
            .collect();
        clauses.join(" OR ")
    }

    /// Runs an edge query keyed on one endpoint column.
    fn query_edges(
        &self,
        column: &str,
        node: NodeId,
        types: &[EdgeType],
    ) -> Result<Vec<Edge>, StorageError> {
        self.assert_node_exists(node)?;
        if types.is_empty() {
            return Ok(Vec::new());
        }

        let mut values = vec![Value::Integer(i64::from(node.0))];
        let filter = Self::type_filter(types, &mut values);
        let sql = format!(
            "SELECT id, source, target, kind, topic, rank FROM edges \
             WHERE {column} = ? AND ({filter}) ORDER BY id"
        );

        let mut stmt = self.conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), read_edge_row)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(edge_from_row(row?)?);
        }
        Ok(result)
    }
}

/// Raw edge columns before label parsing.
type EdgeRow = (u32, u32, u32, String, Option<i64>, Option<i64>);

fn read_edge_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EdgeRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn edge_from_row((id, source, target, kind, topic, rank): EdgeRow) -> Result<Edge, StorageError> {
    let kind: EdgeKind = kind.parse()?;
    let ty = EdgeType::from_parts(kind, topic.map(topic_from_sql))?;
    Ok(Edge {
        id: EdgeId(id),
        source: NodeId(source),
        target: NodeId(target),
        ty,
        rank,
    })
}

// SQLite integers are signed; topic ids round-trip through a bit cast.

fn topic_to_sql(topic: TopicId) -> i64 {
    topic.0 as i64
}

fn topic_from_sql(raw: i64) -> TopicId {
    TopicId(raw as u64)
}

impl GraphStore for SqliteStore {
    fn add_node(&mut self, kind: NodeKind) -> Result<NodeId, StorageError> {
        self.conn.execute(
            "INSERT INTO nodes (id, kind) SELECT COALESCE(MAX(id) + 1, 0), ?1 FROM nodes",
            params![kind.label()],
        )?;
        let id = self.conn.last_insert_rowid();
        let id = u32::try_from(id).map_err(|_| StorageError::IntegrityError {
            reason: format!("node id {id} out of range"),
        })?;
        Ok(NodeId(id))
    }

    fn node_kind(&self, node: NodeId) -> Result<NodeKind, StorageError> {
        let kind: Option<String> = self
            .conn
            .query_row(
                "SELECT kind FROM nodes WHERE id = ?1",
                params![node.0],
                |row| row.get(0),
            )
            .optional()?;
        let kind = kind.ok_or(StorageError::NodeNotFound(node))?;
        Ok(kind.parse::<NodeKind>()?)
    }

    fn nodes(&self) -> Result<Vec<NodeId>, StorageError> {
        let mut stmt = self.conn.prepare_cached("SELECT id FROM nodes ORDER BY id")?;
        let rows = stmt.query_map([], |row| row.get::<_, u32>(0))?;
        let mut result = Vec::new();
        for row in rows {
            result.push(NodeId(row?));
        }
        Ok(result)
    }

    fn create_edge(
        &mut self,
        source: NodeId,
        target: NodeId,
        ty: EdgeType,
        rank: Option<i64>,
    ) -> Result<EdgeId, StorageError> {
        self.assert_node_exists(source)?;
        self.assert_node_exists(target)?;
        self.conn.execute(
            "INSERT INTO edges (source, target, kind, topic, rank) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                source.0,
                target.0,
                ty.kind().label(),
                ty.topic().map(topic_to_sql),
                rank
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        let id = u32::try_from(id).map_err(|_| StorageError::IntegrityError {
            reason: format!("edge id {id} out of range"),
        })?;
        Ok(EdgeId(id))
    }

    fn delete_edge(&mut self, id: EdgeId) -> Result<(), StorageError> {
        let deleted = self
            .conn
            .execute("DELETE FROM edges WHERE id = ?1", params![id.0])?;
        if deleted == 0 {
            return Err(StorageError::EdgeNotFound(id));
        }
        Ok(())
    }

    fn edge(&self, id: EdgeId) -> Result<Option<Edge>, StorageError> {
        let row = self
            .conn
            .query_row(
                "SELECT id, source, target, kind, topic, rank FROM edges WHERE id = ?1",
                params![id.0],
                read_edge_row,
            )
            .optional()?;
        row.map(edge_from_row).transpose()
    }

    fn edges_out(&self, node: NodeId, types: &[EdgeType]) -> Result<Vec<Edge>, StorageError> {
        self.query_edges("source", node, types)
    }

    fn edges_in(&self, node: NodeId, types: &[EdgeType]) -> Result<Vec<Edge>, StorageError> {
        self.query_edges("target", node, types)
    }

    fn has_flag(&self, node: NodeId, flag: Flag) -> Result<bool, StorageError> {
        self.assert_node_exists(node)?;
        let set: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM flags WHERE node_id = ?1 AND name = ?2 AND topic = ?3)",
            params![node.0, flag.name(), topic_to_sql(flag.topic())],
            |row| row.get(0),
        )?;
        Ok(set)
    }

    fn set_flag(&mut self, node: NodeId, flag: Flag) -> Result<(), StorageError> {
        self.assert_node_exists(node)?;
        self.conn.execute(
            "INSERT OR IGNORE INTO flags (node_id, name, topic) VALUES (?1, ?2, ?3)",
            params![node.0, flag.name(), topic_to_sql(flag.topic())],
        )?;
        Ok(())
    }

    fn clear_flag(&mut self, node: NodeId, flag: Flag) -> Result<(), StorageError> {
        self.assert_node_exists(node)?;
        self.conn.execute(
            "DELETE FROM flags WHERE node_id = ?1 AND name = ?2 AND topic = ?3",
            params![node.0, flag.name(), topic_to_sql(flag.topic())],
        )?;
        Ok(())
    }

    fn topics(&self) -> Result<Vec<TopicId>, StorageError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT topic FROM edges WHERE topic IS NOT NULL UNION SELECT topic FROM flags",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, i64>(0))?;
        let mut result = Vec::new();
        for row in rows {
            result.push(topic_from_sql(row?));
        }
        // Sort on the unsigned value, not SQLite's signed one.
        result.sort();
        Ok(result)
    }

    fn transaction<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Self) -> Result<T, E>,
        E: From<StorageError>,
    {
        let name = format!("delegraph_{}", self.depth);
        self.conn
            .execute_batch(&format!("SAVEPOINT {name}"))
            .map_err(StorageError::from)?;
        self.depth += 1;

        let result = f(self);
        self.depth -= 1;

        match result {
            Ok(value) => {
                self.conn
                    .execute_batch(&format!("RELEASE {name}"))
                    .map_err(StorageError::from)?;
                Ok(value)
            }
            Err(err) => {
                tracing::debug!(savepoint = %name, "rolling back sqlite transaction");
                self.conn
                    .execute_batch(&format!("ROLLBACK TO {name}; RELEASE {name}"))
                    .map_err(StorageError::from)?;
                Err(err)
            }
        }
    }
}
