use rusqlite::{Connection, OptionalExtension, params};

use gridsync_core::{Permission, SheetId, UserId, Workbook};

use crate::error::StorageError;
use crate::traits::{DocumentStore, PermissionStore, SheetLoad, SheetRecord};

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &str) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }
}

fn read_record(row: &rusqlite::Row) -> Result<SheetRecord, rusqlite::Error> {
    Ok(SheetRecord {
        sheet_id: SheetId::new(row.get::<_, i64>(0)? as u64),
        owner: UserId::new(row.get::<_, i64>(1)? as u64),
        name: row.get(2)?,
        updated_at_ms: row.get::<_, i64>(3)? as u64,
    })
}

impl DocumentStore for SqliteStore {
    fn create_sheet(&mut self, owner: UserId, name: &str) -> Result<SheetId, StorageError> {
        self.conn.execute(
            "INSERT INTO sheets (owner_id, name) VALUES (?1, ?2)",
            params![owner.get() as i64, name],
        )?;
        Ok(SheetId::new(self.conn.last_insert_rowid() as u64))
    }

    fn load_canonical(&self, sheet_id: SheetId) -> Result<Option<SheetLoad>, StorageError> {
        let row = self
            .conn
            .query_row(
                "SELECT sheet_id, owner_id, name, updated_at, content FROM sheets WHERE sheet_id = ?1",
                params![sheet_id.get() as i64],
                |row| {
                    let record = read_record(row)?;
                    let content: Option<Vec<u8>> = row.get(4)?;
                    Ok((record, content))
                },
            )
            .optional()?;

        match row {
            None => Ok(None),
            Some((record, content)) => {
                let workbook = match content {
                    None => None,
                    Some(bytes) => Some(Workbook::from_msgpack(&bytes)?),
                };
                Ok(Some(SheetLoad { record, workbook }))
            }
        }
    }

    fn save_canonical(
        &mut self,
        sheet_id: SheetId,
        workbook: &Workbook,
    ) -> Result<(), StorageError> {
        let bytes = workbook.to_msgpack()?;
        let changed = self.conn.execute(
            "UPDATE sheets
             SET content = ?1,
                 updated_at = CAST(unixepoch('now','subsec') * 1000 AS INTEGER)
             WHERE sheet_id = ?2",
            params![bytes, sheet_id.get() as i64],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(format!("sheet {sheet_id}")));
        }
        Ok(())
    }

    fn update_display_name(
        &mut self,
        sheet_id: SheetId,
        name: &str,
    ) -> Result<(), StorageError> {
        let changed = self.conn.execute(
            "UPDATE sheets SET name = ?1 WHERE sheet_id = ?2",
            params![name, sheet_id.get() as i64],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(format!("sheet {sheet_id}")));
        }
        Ok(())
    }

    fn get_sheet(&self, sheet_id: SheetId) -> Result<Option<SheetRecord>, StorageError> {
        Ok(self
            .conn
            .query_row(
                "SELECT sheet_id, owner_id, name, updated_at FROM sheets WHERE sheet_id = ?1",
                params![sheet_id.get() as i64],
                read_record,
            )
            .optional()?)
    }
}

impl PermissionStore for SqliteStore {
    fn grant(
        &mut self,
        sheet_id: SheetId,
        user_id: UserId,
        permission: Permission,
    ) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO sheet_permissions (sheet_id, user_id, permission) VALUES (?1, ?2, ?3)
             ON CONFLICT(sheet_id, user_id) DO UPDATE SET permission = excluded.permission",
            params![
                sheet_id.get() as i64,
                user_id.get() as i64,
                permission.as_str()
            ],
        )?;
        Ok(())
    }

    fn revoke(&mut self, sheet_id: SheetId, user_id: UserId) -> Result<(), StorageError> {
        self.conn.execute(
            "DELETE FROM sheet_permissions WHERE sheet_id = ?1 AND user_id = ?2",
            params![sheet_id.get() as i64, user_id.get() as i64],
        )?;
        Ok(())
    }

    fn permission_for(
        &self,
        sheet_id: SheetId,
        user_id: UserId,
    ) -> Result<Option<Permission>, StorageError> {
        let owner: Option<i64> = self
            .conn
            .query_row(
                "SELECT owner_id FROM sheets WHERE sheet_id = ?1",
                params![sheet_id.get() as i64],
                |row| row.get(0),
            )
            .optional()?;
        let Some(owner) = owner else {
            return Ok(None);
        };
        if owner as u64 == user_id.get() {
            return Ok(Some(Permission::Owner));
        }

        let grant: Option<String> = self
            .conn
            .query_row(
                "SELECT permission FROM sheet_permissions WHERE sheet_id = ?1 AND user_id = ?2",
                params![sheet_id.get() as i64, user_id.get() as i64],
                |row| row.get(0),
            )
            .optional()?;
        grant.map(|s| Permission::parse(&s)).transpose().map_err(Into::into)
    }
}
