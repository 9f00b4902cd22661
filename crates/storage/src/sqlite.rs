use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior};
use tracing::trace;

use trolley_core::{
    ids::*, ItemRecord, ListRecord, ListStatus, Quantity, Timestamp, Unit,
};

use crate::error::StorageError;
use crate::traits::{CasOutcome, RecordReader, RecordWriter};

/// Convert Vec<u8> to fixed-size array with proper error handling.
fn to_array<const N: usize>(v: Vec<u8>, label: &str) -> Result<[u8; N], StorageError> {
    v.try_into()
        .map_err(|_| StorageError::Serialization(format!("invalid {label} length")))
}

fn to_timestamp(v: Vec<u8>, label: &str) -> Result<Timestamp, StorageError> {
    Ok(Timestamp::from_bytes(&to_array::<12>(v, label)?))
}

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

    /// Begin a unit of work. Writers take the database lock up front, so two
    /// units racing on one file serialize instead of failing mid-way.
    /// Dropping the unit without [`StoreUnit::commit`] discards every write in it.
    pub fn unit(&mut self) -> Result<StoreUnit<'_>, StorageError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        Ok(StoreUnit { tx })
    }

    /// Begin a read view: every read through it observes one consistent state.
    pub fn view(&mut self) -> Result<StoreUnit<'_>, StorageError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Deferred)?;
        Ok(StoreUnit { tx })
    }
}

pub struct StoreUnit<'a> {
    tx: Transaction<'a>,
}

impl StoreUnit<'_> {
    pub fn commit(self) -> Result<(), StorageError> {
        self.tx.commit()?;
        trace!("unit committed");
        Ok(())
    }

    pub fn discard(self) -> Result<(), StorageError> {
        self.tx.rollback()?;
        trace!("unit discarded");
        Ok(())
    }
}

const LIST_COLUMNS: &str =
    "list_id, owner_id, recipe_id, status, title, note, version, created_at, updated_at";

const ITEM_COLUMNS: &str = "item_id, list_id, ingredient_id, quantity, unit, checked, checked_at, version, position, created_at, updated_at";

struct ListRow {
    list_id: Vec<u8>,
    owner_id: Vec<u8>,
    recipe_id: Option<Vec<u8>>,
    status: String,
    title: String,
    note: String,
    version: i64,
    created_at: Vec<u8>,
    updated_at: Vec<u8>,
}

impl ListRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            list_id: row.get(0)?,
            owner_id: row.get(1)?,
            recipe_id: row.get(2)?,
            status: row.get(3)?,
            title: row.get(4)?,
            note: row.get(5)?,
            version: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn into_record(self) -> Result<ListRecord, StorageError> {
        let recipe_id = match self.recipe_id {
            Some(bytes) => Some(RecipeId::from_bytes(to_array::<16>(bytes, "recipe_id")?)),
            None => None,
        };
        Ok(ListRecord {
            list_id: ListId::from_bytes(to_array::<16>(self.list_id, "list_id")?),
            owner_id: OwnerId::from_bytes(to_array::<16>(self.owner_id, "owner_id")?),
            recipe_id,
            status: ListStatus::parse(&self.status)?,
            title: self.title,
            note: self.note,
            version: self.version as u64,
            created_at: to_timestamp(self.created_at, "created_at")?,
            updated_at: to_timestamp(self.updated_at, "updated_at")?,
        })
    }
}

struct ItemRow {
    item_id: Vec<u8>,
    list_id: Vec<u8>,
    ingredient_id: Vec<u8>,
    quantity: f64,
    unit: String,
    checked: bool,
    checked_at: Option<Vec<u8>>,
    version: i64,
    position: i64,
    created_at: Vec<u8>,
    updated_at: Vec<u8>,
}

impl ItemRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            item_id: row.get(0)?,
            list_id: row.get(1)?,
            ingredient_id: row.get(2)?,
            quantity: row.get(3)?,
            unit: row.get(4)?,
            checked: row.get(5)?,
            checked_at: row.get(6)?,
            version: row.get(7)?,
            position: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    fn into_record(self) -> Result<ItemRecord, StorageError> {
        let quantity = Quantity::new(self.quantity, f64::MAX)
            .map_err(|e| StorageError::Serialization(format!("stored quantity: {e}")))?;
        let unit = Unit::parse(&self.unit)
            .ok_or_else(|| StorageError::Serialization(format!("unknown unit: {}", self.unit)))?;
        let checked_at = match self.checked_at {
            Some(bytes) => Some(to_timestamp(bytes, "checked_at")?),
            None => None,
        };
        Ok(ItemRecord {
            item_id: ItemId::from_bytes(to_array::<16>(self.item_id, "item_id")?),
            list_id: ListId::from_bytes(to_array::<16>(self.list_id, "list_id")?),
            ingredient_id: IngredientId::from_bytes(to_array::<16>(
                self.ingredient_id,
                "ingredient_id",
            )?),
            quantity,
            unit,
            checked: self.checked,
            checked_at,
            version: self.version as u64,
            position: self.position as u32,
            created_at: to_timestamp(self.created_at, "created_at")?,
            updated_at: to_timestamp(self.updated_at, "updated_at")?,
        })
    }
}

fn read_list(conn: &Connection, list_id: ListId) -> Result<Option<ListRecord>, StorageError> {
    let row = conn
        .query_row(
            &format!("SELECT {LIST_COLUMNS} FROM lists WHERE list_id = ?1"),
            rusqlite::params![list_id.as_bytes().as_slice()],
            ListRow::from_row,
        )
        .optional()?;
    row.map(ListRow::into_record).transpose()
}

fn read_lists_for_owner(
    conn: &Connection,
    owner_id: OwnerId,
) -> Result<Vec<ListRecord>, StorageError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {LIST_COLUMNS} FROM lists WHERE owner_id = ?1 ORDER BY created_at, list_id"
    ))?;
    let rows = stmt.query_map(
        rusqlite::params![owner_id.as_bytes().as_slice()],
        ListRow::from_row,
    )?;

    let mut result = Vec::new();
    for row in rows {
        result.push(row?.into_record()?);
    }
    Ok(result)
}

fn read_item(conn: &Connection, item_id: ItemId) -> Result<Option<ItemRecord>, StorageError> {
    let row = conn
        .query_row(
            &format!("SELECT {ITEM_COLUMNS} FROM items WHERE item_id = ?1"),
            rusqlite::params![item_id.as_bytes().as_slice()],
            ItemRow::from_row,
        )
        .optional()?;
    row.map(ItemRow::into_record).transpose()
}

fn read_items(conn: &Connection, list_id: ListId) -> Result<Vec<ItemRecord>, StorageError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ITEM_COLUMNS} FROM items WHERE list_id = ?1 ORDER BY position, item_id"
    ))?;
    let rows = stmt.query_map(
        rusqlite::params![list_id.as_bytes().as_slice()],
        ItemRow::from_row,
    )?;

    let mut result = Vec::new();
    for row in rows {
        result.push(row?.into_record()?);
    }
    Ok(result)
}

impl RecordReader for SqliteStore {
    fn get_list(&self, list_id: ListId) -> Result<Option<ListRecord>, StorageError> {
        read_list(&self.conn, list_id)
    }

    fn lists_for_owner(&self, owner_id: OwnerId) -> Result<Vec<ListRecord>, StorageError> {
        read_lists_for_owner(&self.conn, owner_id)
    }

    fn get_item(&self, item_id: ItemId) -> Result<Option<ItemRecord>, StorageError> {
        read_item(&self.conn, item_id)
    }

    fn get_items(&self, list_id: ListId) -> Result<Vec<ItemRecord>, StorageError> {
        read_items(&self.conn, list_id)
    }
}

impl RecordReader for StoreUnit<'_> {
    fn get_list(&self, list_id: ListId) -> Result<Option<ListRecord>, StorageError> {
        read_list(&self.tx, list_id)
    }

    fn lists_for_owner(&self, owner_id: OwnerId) -> Result<Vec<ListRecord>, StorageError> {
        read_lists_for_owner(&self.tx, owner_id)
    }

    fn get_item(&self, item_id: ItemId) -> Result<Option<ItemRecord>, StorageError> {
        read_item(&self.tx, item_id)
    }

    fn get_items(&self, list_id: ListId) -> Result<Vec<ItemRecord>, StorageError> {
        read_items(&self.tx, list_id)
    }
}

impl RecordWriter for StoreUnit<'_> {
    fn insert_list(&mut self, list: &ListRecord) -> Result<(), StorageError> {
        let result = self.tx.execute(
            "INSERT INTO lists (list_id, owner_id, recipe_id, status, title, note, version, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, ?8)",
            rusqlite::params![
                list.list_id.as_bytes().as_slice(),
                list.owner_id.as_bytes().as_slice(),
                list.recipe_id.map(|r| r.as_bytes().to_vec()),
                list.status.as_str(),
                list.title,
                list.note,
                &list.created_at.to_bytes()[..],
                &list.updated_at.to_bytes()[..],
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StorageError::ConstraintViolation(format!(
                    "list {} already exists",
                    list.list_id
                )))
            }
            Err(e) => Err(StorageError::Sqlite(e)),
        }
    }

    fn insert_item(&mut self, item: &ItemRecord) -> Result<ItemRecord, StorageError> {
        let result = self.tx.execute(
            "INSERT INTO items (item_id, list_id, ingredient_id, quantity, unit, checked, checked_at, version, position, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, (SELECT COALESCE(MAX(position) + 1, 0) FROM items WHERE list_id = ?2), ?8, ?9)",
            rusqlite::params![
                item.item_id.as_bytes().as_slice(),
                item.list_id.as_bytes().as_slice(),
                item.ingredient_id.as_bytes().as_slice(),
                item.quantity.value(),
                item.unit.as_str(),
                item.checked,
                item.checked_at.map(|t| t.to_bytes().to_vec()),
                &item.created_at.to_bytes()[..],
                &item.updated_at.to_bytes()[..],
            ],
        );
        match result {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                return Err(StorageError::DuplicateIngredient {
                    list_id: item.list_id.to_string(),
                    ingredient_id: item.ingredient_id.to_string(),
                });
            }
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY =>
            {
                return Err(StorageError::NotFound(format!("list {}", item.list_id)));
            }
            Err(e) => return Err(StorageError::Sqlite(e)),
        }

        read_item(&self.tx, item.item_id)?
            .ok_or_else(|| StorageError::NotFound(format!("item {}", item.item_id)))
    }

    fn delete_list(&mut self, list_id: ListId) -> Result<bool, StorageError> {
        let removed = self.tx.execute(
            "DELETE FROM lists WHERE list_id = ?1",
            rusqlite::params![list_id.as_bytes().as_slice()],
        )?;
        Ok(removed > 0)
    }

    fn delete_item(&mut self, item_id: ItemId) -> Result<bool, StorageError> {
        let removed = self.tx.execute(
            "DELETE FROM items WHERE item_id = ?1",
            rusqlite::params![item_id.as_bytes().as_slice()],
        )?;
        Ok(removed > 0)
    }

    fn cas_item(
        &mut self,
        next: &ItemRecord,
        expected_version: u64,
    ) -> Result<CasOutcome<ItemRecord>, StorageError> {
        let changed = self.tx.execute(
            "UPDATE items SET quantity = ?1, unit = ?2, checked = ?3, checked_at = ?4, updated_at = ?5, version = version + 1
             WHERE item_id = ?6 AND version = ?7",
            rusqlite::params![
                next.quantity.value(),
                next.unit.as_str(),
                next.checked,
                next.checked_at.map(|t| t.to_bytes().to_vec()),
                &next.updated_at.to_bytes()[..],
                next.item_id.as_bytes().as_slice(),
                expected_version as i64,
            ],
        )?;

        let current = read_item(&self.tx, next.item_id)?;
        Ok(match (changed, current) {
            (_, None) => CasOutcome::Missing,
            (0, Some(current)) => CasOutcome::Stale {
                current_version: current.version,
            },
            (_, Some(stored)) => CasOutcome::Applied(stored),
        })
    }

    fn cas_list(
        &mut self,
        next: &ListRecord,
        expected_version: u64,
    ) -> Result<CasOutcome<ListRecord>, StorageError> {
        let changed = self.tx.execute(
            "UPDATE lists SET status = ?1, title = ?2, note = ?3, updated_at = ?4, version = version + 1
             WHERE list_id = ?5 AND version = ?6",
            rusqlite::params![
                next.status.as_str(),
                next.title,
                next.note,
                &next.updated_at.to_bytes()[..],
                next.list_id.as_bytes().as_slice(),
                expected_version as i64,
            ],
        )?;

        let current = read_list(&self.tx, next.list_id)?;
        Ok(match (changed, current) {
            (_, None) => CasOutcome::Missing,
            (0, Some(current)) => CasOutcome::Stale {
                current_version: current.version,
            },
            (_, Some(stored)) => CasOutcome::Applied(stored),
        })
    }
}
