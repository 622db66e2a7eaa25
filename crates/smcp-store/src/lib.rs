//! # smcp-store
//!
//! SQLite storage for prompts, resources, and tools.
//!
//! This database is the source of truth. The vector index in `smcp-index`
//! is derived from it and can always be rebuilt from [`Database`] contents.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use smcp_core::{
    new_entity_id, EntityKind, EntityRepository, Prompt, PromptCreate, PromptUpdate, Resource,
    ResourceCreate, ResourceUpdate, Result, SmcpError, Tool, ToolCreate, ToolUpdate,
};

/// Handle on the entity database.
pub struct Database {
    conn: Connection,
}

fn storage(e: rusqlite::Error) -> SmcpError {
    SmcpError::Storage(e.to_string())
}

fn encode_tags(tags: &[String]) -> Result<String> {
    Ok(serde_json::to_string(tags)?)
}

/// Column helpers for row mapping. Conversion failures surface as rusqlite
/// errors so they flow through `query_map`.
fn tags_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Vec<String>> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn role_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<smcp_core::PromptRole> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e: SmcpError| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn prompt_from_row(row: &Row<'_>) -> rusqlite::Result<Prompt> {
    Ok(Prompt {
        id: row.get(0)?,
        name: row.get(1)?,
        role: role_at(row, 2)?,
        content: row.get(3)?,
        tags: tags_at(row, 4)?,
        updated_at: timestamp_at(row, 5)?,
    })
}

fn resource_from_row(row: &Row<'_>) -> rusqlite::Result<Resource> {
    Ok(Resource {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        content: row.get(3)?,
        category: row.get(4)?,
        tags: tags_at(row, 5)?,
        updated_at: timestamp_at(row, 6)?,
    })
}

fn tool_from_row(row: &Row<'_>) -> rusqlite::Result<Tool> {
    Ok(Tool {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        code: row.get(3)?,
        tags: tags_at(row, 4)?,
        updated_at: timestamp_at(row, 5)?,
    })
}

const PROMPT_COLUMNS: &str = "id, name, role, content, tags, updated_at";
const RESOURCE_COLUMNS: &str = "id, name, description, content, category, tags, updated_at";
const TOOL_COLUMNS: &str = "id, name, description, code, tags, updated_at";

impl Database {
    /// Open or create a database at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`SmcpError::Storage`] if the database cannot be opened.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(storage)?;
        let db = Self { conn };
        db.create_schema()?;
        tracing::debug!(path = %path.display(), "opened entity database");
        Ok(db)
    }

    /// Create an in-memory database (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns [`SmcpError::Storage`] if schema creation fails.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(storage)?;
        let db = Self { conn };
        db.create_schema()?;
        Ok(db)
    }

    fn create_schema(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
            CREATE TABLE IF NOT EXISTS prompts (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                tags TEXT NOT NULL DEFAULT '[]',
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS resources (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT NOT NULL,
                content TEXT NOT NULL,
                category TEXT NOT NULL,
                tags TEXT NOT NULL DEFAULT '[]',
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS tools (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT NOT NULL,
                code TEXT NOT NULL,
                tags TEXT NOT NULL DEFAULT '[]',
                updated_at TEXT NOT NULL
            );
            ",
            )
            .map_err(storage)?;
        Ok(())
    }

    fn query_all<T>(
        &self,
        sql: &str,
        map: fn(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>> {
        let mut stmt = self.conn.prepare(sql).map_err(storage)?;
        let rows = stmt
            .query_map([], map)
            .map_err(storage)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(storage)?;
        Ok(rows)
    }

    fn query_one<T>(
        &self,
        sql: &str,
        id: &str,
        map: fn(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Option<T>> {
        self.conn
            .query_row(sql, params![id], map)
            .optional()
            .map_err(storage)
    }

    fn delete_from(&self, kind: EntityKind, id: &str) -> Result<bool> {
        let changed = self
            .conn
            .execute(
                &format!("DELETE FROM {} WHERE id = ?1", table(kind)),
                params![id],
            )
            .map_err(storage)?;
        Ok(changed > 0)
    }

    /// Number of stored entities of `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`SmcpError::Storage`] if the query fails.
    pub fn count(&self, kind: EntityKind) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", table(kind)), [], |row| {
                row.get(0)
            })
            .map_err(storage)?;
        Ok(count as u64)
    }

    // === Prompts ===

    /// # Errors
    ///
    /// Returns [`SmcpError::Storage`] if the query fails.
    pub fn list_prompts(&self) -> Result<Vec<Prompt>> {
        self.query_all(
            &format!("SELECT {PROMPT_COLUMNS} FROM prompts ORDER BY updated_at, id"),
            prompt_from_row,
        )
    }

    /// # Errors
    ///
    /// Returns [`SmcpError::Storage`] if the query fails.
    pub fn get_prompt(&self, id: &str) -> Result<Option<Prompt>> {
        self.query_one(
            &format!("SELECT {PROMPT_COLUMNS} FROM prompts WHERE id = ?1"),
            id,
            prompt_from_row,
        )
    }

    /// # Errors
    ///
    /// Returns [`SmcpError::Storage`] if the insert fails.
    pub fn create_prompt(&self, data: PromptCreate) -> Result<Prompt> {
        let prompt = Prompt {
            id: new_entity_id(EntityKind::Prompt),
            name: data.name,
            role: data.role,
            content: data.content,
            tags: data.tags,
            updated_at: Utc::now(),
        };
        self.write_prompt("INSERT", &prompt)?;
        Ok(prompt)
    }

    /// Apply a partial update. Returns `None` if the prompt does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`SmcpError::Storage`] if the update fails.
    pub fn update_prompt(&self, id: &str, data: PromptUpdate) -> Result<Option<Prompt>> {
        let Some(mut prompt) = self.get_prompt(id)? else {
            return Ok(None);
        };
        data.apply(&mut prompt);
        prompt.updated_at = Utc::now();
        self.write_prompt("REPLACE", &prompt)?;
        Ok(Some(prompt))
    }

    /// # Errors
    ///
    /// Returns [`SmcpError::Storage`] if the delete fails.
    pub fn delete_prompt(&self, id: &str) -> Result<bool> {
        self.delete_from(EntityKind::Prompt, id)
    }

    fn write_prompt(&self, verb: &str, p: &Prompt) -> Result<()> {
        self.conn
            .execute(
                &format!("{verb} INTO prompts ({PROMPT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
                params![
                    p.id,
                    p.name,
                    p.role.as_str(),
                    p.content,
                    encode_tags(&p.tags)?,
                    p.updated_at.to_rfc3339(),
                ],
            )
            .map_err(storage)?;
        Ok(())
    }

    // === Resources ===

    /// # Errors
    ///
    /// Returns [`SmcpError::Storage`] if the query fails.
    pub fn list_resources(&self) -> Result<Vec<Resource>> {
        self.query_all(
            &format!("SELECT {RESOURCE_COLUMNS} FROM resources ORDER BY updated_at, id"),
            resource_from_row,
        )
    }

    /// # Errors
    ///
    /// Returns [`SmcpError::Storage`] if the query fails.
    pub fn get_resource(&self, id: &str) -> Result<Option<Resource>> {
        self.query_one(
            &format!("SELECT {RESOURCE_COLUMNS} FROM resources WHERE id = ?1"),
            id,
            resource_from_row,
        )
    }

    /// # Errors
    ///
    /// Returns [`SmcpError::Storage`] if the insert fails.
    pub fn create_resource(&self, data: ResourceCreate) -> Result<Resource> {
        let resource = Resource {
            id: new_entity_id(EntityKind::Resource),
            name: data.name,
            description: data.description,
            content: data.content,
            category: data.category,
            tags: data.tags,
            updated_at: Utc::now(),
        };
        self.write_resource("INSERT", &resource)?;
        Ok(resource)
    }

    /// Apply a partial update. Returns `None` if the resource does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`SmcpError::Storage`] if the update fails.
    pub fn update_resource(&self, id: &str, data: ResourceUpdate) -> Result<Option<Resource>> {
        let Some(mut resource) = self.get_resource(id)? else {
            return Ok(None);
        };
        data.apply(&mut resource);
        resource.updated_at = Utc::now();
        self.write_resource("REPLACE", &resource)?;
        Ok(Some(resource))
    }

    /// # Errors
    ///
    /// Returns [`SmcpError::Storage`] if the delete fails.
    pub fn delete_resource(&self, id: &str) -> Result<bool> {
        self.delete_from(EntityKind::Resource, id)
    }

    fn write_resource(&self, verb: &str, r: &Resource) -> Result<()> {
        self.conn
            .execute(
                &format!(
                    "{verb} INTO resources ({RESOURCE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
                ),
                params![
                    r.id,
                    r.name,
                    r.description,
                    r.content,
                    r.category,
                    encode_tags(&r.tags)?,
                    r.updated_at.to_rfc3339(),
                ],
            )
            .map_err(storage)?;
        Ok(())
    }

    // === Tools ===

    /// # Errors
    ///
    /// Returns [`SmcpError::Storage`] if the query fails.
    pub fn list_tools(&self) -> Result<Vec<Tool>> {
        self.query_all(
            &format!("SELECT {TOOL_COLUMNS} FROM tools ORDER BY updated_at, id"),
            tool_from_row,
        )
    }

    /// # Errors
    ///
    /// Returns [`SmcpError::Storage`] if the query fails.
    pub fn get_tool(&self, id: &str) -> Result<Option<Tool>> {
        self.query_one(
            &format!("SELECT {TOOL_COLUMNS} FROM tools WHERE id = ?1"),
            id,
            tool_from_row,
        )
    }

    /// # Errors
    ///
    /// Returns [`SmcpError::Storage`] if the insert fails.
    pub fn create_tool(&self, data: ToolCreate) -> Result<Tool> {
        let tool = Tool {
            id: new_entity_id(EntityKind::Tool),
            name: data.name,
            description: data.description,
            code: data.code,
            tags: data.tags,
            updated_at: Utc::now(),
        };
        self.write_tool("INSERT", &tool)?;
        Ok(tool)
    }

    /// Apply a partial update. Returns `None` if the tool does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`SmcpError::Storage`] if the update fails.
    pub fn update_tool(&self, id: &str, data: ToolUpdate) -> Result<Option<Tool>> {
        let Some(mut tool) = self.get_tool(id)? else {
            return Ok(None);
        };
        data.apply(&mut tool);
        tool.updated_at = Utc::now();
        self.write_tool("REPLACE", &tool)?;
        Ok(Some(tool))
    }

    /// # Errors
    ///
    /// Returns [`SmcpError::Storage`] if the delete fails.
    pub fn delete_tool(&self, id: &str) -> Result<bool> {
        self.delete_from(EntityKind::Tool, id)
    }

    fn write_tool(&self, verb: &str, t: &Tool) -> Result<()> {
        self.conn
            .execute(
                &format!("{verb} INTO tools ({TOOL_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
                params![
                    t.id,
                    t.name,
                    t.description,
                    t.code,
                    encode_tags(&t.tags)?,
                    t.updated_at.to_rfc3339(),
                ],
            )
            .map_err(storage)?;
        Ok(())
    }
}

const fn table(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Prompt => "prompts",
        EntityKind::Resource => "resources",
        EntityKind::Tool => "tools",
    }
}

impl EntityRepository<Prompt> for Database {
    fn list(&self) -> Result<Vec<Prompt>> {
        self.list_prompts()
    }

    fn get(&self, id: &str) -> Result<Option<Prompt>> {
        self.get_prompt(id)
    }
}

impl EntityRepository<Resource> for Database {
    fn list(&self) -> Result<Vec<Resource>> {
        self.list_resources()
    }

    fn get(&self, id: &str) -> Result<Option<Resource>> {
        self.get_resource(id)
    }
}

impl EntityRepository<Tool> for Database {
    fn list(&self) -> Result<Vec<Tool>> {
        self.list_tools()
    }

    fn get(&self, id: &str) -> Result<Option<Tool>> {
        self.get_tool(id)
    }
}
