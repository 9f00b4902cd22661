pub mod access;
pub mod builder;
pub mod config;
pub mod error;
mod updates;

pub use access::{AccessPolicy, Caller, OwnerOnly};
pub use builder::{ListBuilder, RecipeDraft};
pub use config::EngineConfig;
pub use error::{EngineError, ItemValidationError};

use std::collections::HashSet;

use tracing::{debug, info, instrument};

use trolley_core::{
    changes::validate_title, ids::*, Clock, ItemRecord, ListAggregate, ListChanges, ListRecord,
    ListSnapshot, ListStatus, NewItem, NewList, Quantity, Timestamp, Unit, ValidationErrors,
};
use trolley_storage::{
    CasOutcome, RecordReader, RecordWriter, SqliteStore, StorageError,
};

/// Server side of the shopping-list engine: owns the record store and the
/// clock, and applies every list and item mutation under an ownership check.
pub struct ListService {
    config: EngineConfig,
    clock: Clock,
    store: SqliteStore,
    policy: Box<dyn AccessPolicy>,
}

impl ListService {
    pub fn new(store: SqliteStore, config: EngineConfig) -> Self {
        Self {
            config,
            clock: Clock::new(),
            store,
            policy: Box::new(OwnerOnly),
        }
    }

    pub fn open(path: &str, config: EngineConfig) -> Result<Self, EngineError> {
        Ok(Self::new(SqliteStore::open(path)?, config))
    }

    pub fn open_in_memory(config: EngineConfig) -> Result<Self, EngineError> {
        Ok(Self::new(SqliteStore::open_in_memory()?, config))
    }

    pub fn with_policy(mut self, policy: impl AccessPolicy + 'static) -> Self {
        self.policy = Box::new(policy);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    /// Look up a list the caller is allowed to mutate.
    fn require_list(&self, caller: &Caller, list_id: ListId) -> Result<ListRecord, EngineError> {
        let list = self
            .store
            .get_list(list_id)?
            .ok_or_else(|| EngineError::ListNotFound(list_id.to_string()))?;
        authorize(self.policy.as_ref(), caller, &list, Access::Mutate)?;
        Ok(list)
    }

    /// Look up an item whose list the caller is allowed to mutate.
    fn require_item(&self, caller: &Caller, item_id: ItemId) -> Result<ItemRecord, EngineError> {
        let item = self
            .store
            .get_item(item_id)?
            .ok_or_else(|| EngineError::ItemNotFound(item_id.to_string()))?;
        self.require_list(caller, item.list_id)?;
        Ok(item)
    }

    // ========================================================================
    // List lifecycle
    // ========================================================================

    /// Create a list with an optional initial item set, all at version 0.
    #[instrument(level = "debug", skip_all, fields(owner = %caller.owner_id))]
    pub fn create_list(
        &mut self,
        caller: &Caller,
        new_list: NewList,
    ) -> Result<ListSnapshot, EngineError> {
        let validated = validate_new_list(&new_list, self.config.max_quantity)?;
        let now = self.clock.tick()?;
        let list = ListRecord {
            list_id: ListId::new(),
            owner_id: caller.owner_id,
            recipe_id: new_list.recipe_id,
            status: ListStatus::Pending,
            title: new_list.title.trim().to_string(),
            note: new_list.note,
            version: 0,
            created_at: now,
            updated_at: now,
        };

        let mut work = self.store.unit()?;
        work.insert_list(&list)?;
        let mut items = Vec::with_capacity(validated.len());
        for (ingredient_id, quantity, unit) in validated {
            let record = new_item_record(list.list_id, ingredient_id, quantity, unit, now);
            items.push(work.insert_item(&record)?);
        }
        work.commit()?;

        info!(list_id = %list.list_id, items = items.len(), "list created");
        Ok(ListSnapshot::new(list, items))
    }

    /// Create a list from the item set a recipe builder produces. Repeated
    /// ingredients with the same unit are folded into one item.
    pub fn create_list_from_recipe(
        &mut self,
        caller: &Caller,
        recipe_id: RecipeId,
        builder: &dyn ListBuilder,
    ) -> Result<ListSnapshot, EngineError> {
        let draft = builder
            .build(recipe_id)
            .map_err(|e| EngineError::Builder(e.to_string()))?
            .ok_or_else(|| EngineError::RecipeNotFound(recipe_id.to_string()))?;
        let new_list = NewList {
            title: draft.title,
            note: draft.note,
            recipe_id: Some(recipe_id),
            items: consolidate(draft.items),
        };
        self.create_list(caller, new_list)
    }

    pub fn add_item(
        &mut self,
        caller: &Caller,
        list_id: ListId,
        new_item: NewItem,
    ) -> Result<ItemRecord, EngineError> {
        let list = self.require_list(caller, list_id)?;
        if list.status == ListStatus::Completed {
            return Err(EngineError::invalid(
                "status",
                "items cannot be added to a completed list",
            ));
        }
        let (quantity, unit) = new_item
            .validate(self.config.max_quantity)
            .map_err(EngineError::Validation)?;
        let now = self.clock.tick()?;
        let record = new_item_record(list_id, new_item.ingredient_id, quantity, unit, now);

        let mut work = self.store.unit()?;
        let item = match work.insert_item(&record) {
            Ok(item) => item,
            Err(StorageError::DuplicateIngredient { .. }) => {
                return Err(EngineError::invalid(
                    "ingredient",
                    "this ingredient is already on the list",
                ));
            }
            Err(e) => return Err(e.into()),
        };
        work.commit()?;

        debug!(list_id = %list_id, item_id = %item.item_id, "item added");
        Ok(item)
    }

    pub fn delete_item(&mut self, caller: &Caller, item_id: ItemId) -> Result<(), EngineError> {
        self.require_item(caller, item_id)?;
        let mut work = self.store.unit()?;
        if !work.delete_item(item_id)? {
            return Err(EngineError::ItemNotFound(item_id.to_string()));
        }
        work.commit()?;
        debug!(item_id = %item_id, "item deleted");
        Ok(())
    }

    /// Delete a list together with all of its items.
    pub fn delete_list(&mut self, caller: &Caller, list_id: ListId) -> Result<(), EngineError> {
        self.require_list(caller, list_id)?;
        let mut work = self.store.unit()?;
        if !work.delete_list(list_id)? {
            return Err(EngineError::ListNotFound(list_id.to_string()));
        }
        work.commit()?;
        info!(list_id = %list_id, "list deleted");
        Ok(())
    }

    pub fn update_list_details(
        &mut self,
        caller: &Caller,
        list_id: ListId,
        changes: &ListChanges,
        expected_version: u64,
    ) -> Result<ListRecord, EngineError> {
        let list = self.require_list(caller, list_id)?;
        changes.validate().map_err(EngineError::Validation)?;
        self.clock.observe(list.updated_at);
        let now = self.clock.tick()?;

        let mut work = self.store.unit()?;
        let current = work
            .get_list(list_id)?
            .ok_or_else(|| EngineError::ListNotFound(list_id.to_string()))?;
        let mut next = current.clone();
        if let Some(title) = &changes.title {
            next.title = title.trim().to_string();
        }
        if let Some(note) = &changes.note {
            next.note = note.clone();
        }
        next.updated_at = now;

        match work.cas_list(&next, expected_version)? {
            CasOutcome::Applied(list) => {
                work.commit()?;
                Ok(list)
            }
            CasOutcome::Stale { current_version } => Err(EngineError::ListConflict {
                list_id: list_id.to_string(),
                expected: expected_version,
                current: current_version,
            }),
            CasOutcome::Missing => Err(EngineError::ListNotFound(list_id.to_string())),
        }
    }

    /// Move a list forward through pending → in_progress → completed.
    /// Completion requires at least one item and no unchecked items.
    #[instrument(level = "debug", skip(self, caller), fields(list_id = %list_id))]
    pub fn set_status(
        &mut self,
        caller: &Caller,
        list_id: ListId,
        status: ListStatus,
    ) -> Result<ListRecord, EngineError> {
        let list = self.require_list(caller, list_id)?;
        self.clock.observe(list.updated_at);
        let now = self.clock.tick()?;

        let mut work = self.store.unit()?;
        let current = work
            .get_list(list_id)?
            .ok_or_else(|| EngineError::ListNotFound(list_id.to_string()))?;
        if !current.status.can_transition_to(status) {
            return Err(EngineError::invalid(
                "status",
                format!("cannot move a list from {} back to {}", current.status, status),
            ));
        }
        if current.status == status {
            return Ok(current);
        }
        if status == ListStatus::Completed {
            let aggregate = ListAggregate::compute(&work.get_items(list_id)?);
            if !aggregate.can_be_completed {
                let message = if aggregate.total_count == 0 {
                    "an empty list cannot be completed".to_string()
                } else {
                    format!("{} items are still unchecked", aggregate.unchecked_count)
                };
                return Err(EngineError::invalid("status", message));
            }
        }

        let mut next = current.clone();
        next.status = status;
        next.updated_at = now;
        match work.cas_list(&next, current.version)? {
            CasOutcome::Applied(list) => {
                work.commit()?;
                info!(status = %list.status, "list status changed");
                Ok(list)
            }
            CasOutcome::Stale { current_version } => Err(EngineError::ListConflict {
                list_id: list_id.to_string(),
                expected: current.version,
                current: current_version,
            }),
            CasOutcome::Missing => Err(EngineError::ListNotFound(list_id.to_string())),
        }
    }

    pub fn complete_list(
        &mut self,
        caller: &Caller,
        list_id: ListId,
    ) -> Result<ListRecord, EngineError> {
        self.set_status(caller, list_id, ListStatus::Completed)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Fetch the authoritative state of a list: header, items in insertion
    /// order with their versions, and a freshly computed aggregate.
    pub fn snapshot(
        &mut self,
        caller: &Caller,
        list_id: ListId,
    ) -> Result<ListSnapshot, EngineError> {
        let view = self.store.view()?;
        let list = view
            .get_list(list_id)?
            .ok_or_else(|| EngineError::ListNotFound(list_id.to_string()))?;
        authorize(self.policy.as_ref(), caller, &list, Access::Read)?;
        let items = view.get_items(list_id)?;
        view.commit()?;
        Ok(ListSnapshot::new(list, items))
    }

    /// The caller's lists, minus any the access policy keeps them from reading.
    pub fn lists_for_owner(&self, caller: &Caller) -> Result<Vec<ListRecord>, EngineError> {
        let mut lists = self.store.lists_for_owner(caller.owner_id)?;
        lists.retain(|list| self.policy.can_read(caller, list));
        Ok(lists)
    }

    pub fn get_item(&self, caller: &Caller, item_id: ItemId) -> Result<ItemRecord, EngineError> {
        let item = self
            .store
            .get_item(item_id)?
            .ok_or_else(|| EngineError::ItemNotFound(item_id.to_string()))?;
        let list = self
            .store
            .get_list(item.list_id)?
            .ok_or_else(|| EngineError::ListNotFound(item.list_id.to_string()))?;
        authorize(self.policy.as_ref(), caller, &list, Access::Read)?;
        Ok(item)
    }
}

#[derive(Clone, Copy)]
enum Access {
    Read,
    Mutate,
}

fn authorize(
    policy: &dyn AccessPolicy,
    caller: &Caller,
    list: &ListRecord,
    access: Access,
) -> Result<(), EngineError> {
    let allowed = match access {
        Access::Read => policy.can_read(caller, list),
        Access::Mutate => policy.can_mutate(caller, list),
    };
    if allowed {
        Ok(())
    } else {
        Err(EngineError::Unauthorized {
            caller: caller.owner_id.to_string(),
            list_id: list.list_id.to_string(),
        })
    }
}

fn new_item_record(
    list_id: ListId,
    ingredient_id: IngredientId,
    quantity: Quantity,
    unit: Unit,
    now: Timestamp,
) -> ItemRecord {
    ItemRecord {
        item_id: ItemId::new(),
        list_id,
        ingredient_id,
        quantity,
        unit,
        checked: false,
        checked_at: None,
        version: 0,
        position: 0,
        created_at: now,
        updated_at: now,
    }
}

fn validate_new_list(
    new_list: &NewList,
    max_quantity: f64,
) -> Result<Vec<(IngredientId, Quantity, Unit)>, EngineError> {
    let mut errors = ValidationErrors::new();
    validate_title(&new_list.title, &mut errors);

    let mut seen = HashSet::new();
    let mut items = Vec::with_capacity(new_list.items.len());
    for (i, item) in new_list.items.iter().enumerate() {
        let prefix = format!("items[{i}]");
        if !seen.insert(item.ingredient_id) {
            errors.add(&format!("{prefix}.ingredient"), "ingredient appears more than once");
        }
        match item.validate(max_quantity) {
            Ok((quantity, unit)) => items.push((item.ingredient_id, quantity, unit)),
            Err(item_errors) => errors.merge_prefixed(&prefix, item_errors),
        }
    }
    errors.into_result(items).map_err(EngineError::Validation)
}

fn consolidate(items: Vec<NewItem>) -> Vec<NewItem> {
    let mut merged: Vec<NewItem> = Vec::with_capacity(items.len());
    for item in items {
        let unit = Unit::parse(&item.unit);
        let existing = merged.iter_mut().find(|m| {
            m.ingredient_id == item.ingredient_id && unit.is_some() && Unit::parse(&m.unit) == unit
        });
        match existing {
            Some(m) => m.quantity += item.quantity,
            None => merged.push(item),
        }
    }
    merged
}
