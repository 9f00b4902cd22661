#![allow(dead_code)]

use trolley_core::{ids::*, ItemRecord, ListSnapshot, NewItem, NewList};
use trolley_engine::{Caller, EngineConfig, EngineError, ListService};

/// A service with one owner and one freshly created list.
pub struct Fixture {
    pub service: ListService,
    pub owner: Caller,
    pub list: ListSnapshot,
}

impl Fixture {
    /// A list holding `items` pieces of distinct ingredients, 1..=items each.
    pub fn with_items(items: usize) -> Result<Self, EngineError> {
        let mut service = ListService::open_in_memory(EngineConfig::default())?;
        let owner = Caller::new(OwnerId::new());
        let mut new_list = NewList::titled("Weekly shop");
        for n in 0..items {
            new_list = new_list.with_item(NewItem::new(IngredientId::new(), (n + 1) as f64, "piece"));
        }
        let list = service.create_list(&owner, new_list)?;
        Ok(Self { service, owner, list })
    }

    pub fn item(&self, index: usize) -> &ItemRecord {
        &self.list.items[index]
    }

    pub fn list_id(&self) -> ListId {
        self.list.list.list_id
    }

    pub fn reload(&mut self) -> Result<&ListSnapshot, EngineError> {
        self.list = self.service.snapshot(&self.owner, self.list_id())?;
        Ok(&self.list)
    }

    pub fn stranger() -> Caller {
        Caller::new(OwnerId::new())
    }
}
