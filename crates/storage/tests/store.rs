use std::sync::Barrier;

use trolley_core::{
    ids::*, Clock, ItemRecord, ListRecord, ListStatus, Quantity, Timestamp, Unit,
};
use trolley_storage::{CasOutcome, RecordReader, RecordWriter, SqliteStore, StorageError};

fn new_list(owner_id: OwnerId) -> ListRecord {
    let now = Timestamp::from_millis(1_000);
    ListRecord {
        list_id: ListId::new(),
        owner_id,
        recipe_id: None,
        status: ListStatus::Pending,
        title: "Groceries".into(),
        note: String::new(),
        version: 0,
        created_at: now,
        updated_at: now,
    }
}

fn new_item(list_id: ListId) -> ItemRecord {
    let now = Timestamp::from_millis(1_000);
    ItemRecord {
        item_id: ItemId::new(),
        list_id,
        ingredient_id: IngredientId::new(),
        quantity: Quantity::new(2.0, Quantity::DEFAULT_MAX).unwrap(),
        unit: Unit::Piece,
        checked: false,
        checked_at: None,
        version: 0,
        position: 0,
        created_at: now,
        updated_at: now,
    }
}

fn seed(store: &mut SqliteStore, items: usize) -> Result<(ListRecord, Vec<ItemRecord>), StorageError> {
    let list = new_list(OwnerId::new());
    let mut unit = store.unit()?;
    unit.insert_list(&list)?;
    let mut stored = Vec::new();
    for _ in 0..items {
        stored.push(unit.insert_item(&new_item(list.list_id))?);
    }
    unit.commit()?;
    Ok((list, stored))
}

// ============================================================================
// Records
// ============================================================================

#[test]
fn inserted_records_start_at_version_zero() -> Result<(), Box<dyn std::error::Error>> {
    let mut store = SqliteStore::open_in_memory()?;
    let (list, items) = seed(&mut store, 3)?;

    let stored = store.get_list(list.list_id)?.unwrap();
    assert_eq!(stored, list);

    let positions: Vec<u32> = store.get_items(list.list_id)?.iter().map(|i| i.position).collect();
    assert_eq!(positions, vec![0, 1, 2]);
    assert!(items.iter().all(|i| i.version == 0));
    Ok(())
}

#[test]
fn duplicate_ingredient_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let mut store = SqliteStore::open_in_memory()?;
    let (_, items) = seed(&mut store, 1)?;

    let mut twin = new_item(items[0].list_id);
    twin.ingredient_id = items[0].ingredient_id;
    let mut unit = store.unit()?;
    let result = unit.insert_item(&twin);
    assert!(matches!(result, Err(StorageError::DuplicateIngredient { .. })));
    Ok(())
}

#[test]
fn item_for_unknown_list_is_not_found() -> Result<(), Box<dyn std::error::Error>> {
    let mut store = SqliteStore::open_in_memory()?;
    let mut unit = store.unit()?;
    let result = unit.insert_item(&new_item(ListId::new()));
    assert!(matches!(result, Err(StorageError::NotFound(_))));
    Ok(())
}

#[test]
fn deleting_list_cascades_to_items() -> Result<(), Box<dyn std::error::Error>> {
    let mut store = SqliteStore::open_in_memory()?;
    let (list, items) = seed(&mut store, 2)?;

    let mut unit = store.unit()?;
    assert!(unit.delete_list(list.list_id)?);
    unit.commit()?;

    assert!(store.get_list(list.list_id)?.is_none());
    assert!(store.get_item(items[0].item_id)?.is_none());
    assert!(store.get_items(list.list_id)?.is_empty());
    Ok(())
}

#[test]
fn lists_for_owner_only_returns_own_lists() -> Result<(), Box<dyn std::error::Error>> {
    let mut store = SqliteStore::open_in_memory()?;
    let (mine, _) = seed(&mut store, 0)?;
    seed(&mut store, 0)?;

    let lists = store.lists_for_owner(mine.owner_id)?;
    assert_eq!(lists.len(), 1);
    assert_eq!(lists[0].list_id, mine.list_id);
    Ok(())
}

// ============================================================================
// Compare-and-swap
// ============================================================================

#[test]
fn cas_with_current_version_advances_by_one() -> Result<(), Box<dyn std::error::Error>> {
    let mut store = SqliteStore::open_in_memory()?;
    let (_, items) = seed(&mut store, 1)?;

    let mut next = items[0].clone();
    next.checked = true;
    next.version = 99; // ignored by the store

    let mut unit = store.unit()?;
    let outcome = unit.cas_item(&next, 0)?;
    unit.commit()?;

    match outcome {
        CasOutcome::Applied(stored) => {
            assert_eq!(stored.version, 1);
            assert!(stored.checked);
        }
        other => panic!("expected Applied, got {other:?}"),
    }
    Ok(())
}

#[test]
fn cas_with_stale_version_writes_nothing() -> Result<(), Box<dyn std::error::Error>> {
    let mut store = SqliteStore::open_in_memory()?;
    let (_, items) = seed(&mut store, 1)?;
    let original = items[0].clone();

    let mut next = original.clone();
    next.quantity = Quantity::new(7.0, Quantity::DEFAULT_MAX).unwrap();

    let mut unit = store.unit()?;
    assert!(unit.cas_item(&next, 0)?.is_applied());
    let outcome = unit.cas_item(&next, 0)?;
    unit.commit()?;

    assert_eq!(outcome, CasOutcome::Stale { current_version: 1 });
    assert_eq!(store.get_item(original.item_id)?.unwrap().version, 1);
    Ok(())
}

#[test]
fn cas_on_deleted_item_reports_missing() -> Result<(), Box<dyn std::error::Error>> {
    let mut store = SqliteStore::open_in_memory()?;
    let (_, items) = seed(&mut store, 1)?;

    let mut unit = store.unit()?;
    unit.delete_item(items[0].item_id)?;
    assert_eq!(unit.cas_item(&items[0], 0)?, CasOutcome::Missing);
    Ok(())
}

#[test]
fn cas_list_tracks_its_own_version() -> Result<(), Box<dyn std::error::Error>> {
    let mut store = SqliteStore::open_in_memory()?;
    let (list, _) = seed(&mut store, 0)?;

    let mut next = list.clone();
    next.status = ListStatus::InProgress;
    let mut unit = store.unit()?;
    let stored = match unit.cas_list(&next, 0)? {
        CasOutcome::Applied(stored) => stored,
        other => panic!("expected Applied, got {other:?}"),
    };
    assert_eq!(stored.version, 1);
    assert_eq!(
        unit.cas_list(&next, 0)?,
        CasOutcome::Stale { current_version: 1 }
    );
    unit.commit()?;
    Ok(())
}

// ============================================================================
// Units of work
// ============================================================================

#[test]
fn discarded_unit_leaves_no_trace() -> Result<(), Box<dyn std::error::Error>> {
    let mut store = SqliteStore::open_in_memory()?;
    let (_, items) = seed(&mut store, 2)?;

    let mut unit = store.unit()?;
    for item in &items {
        let mut next = item.clone();
        next.checked = true;
        assert!(unit.cas_item(&next, 0)?.is_applied());
    }
    unit.discard()?;

    for item in &items {
        let stored = store.get_item(item.item_id)?.unwrap();
        assert_eq!(stored.version, 0);
        assert!(!stored.checked);
    }
    Ok(())
}

#[test]
fn dropped_unit_rolls_back() -> Result<(), Box<dyn std::error::Error>> {
    let mut store = SqliteStore::open_in_memory()?;
    let (list, _) = seed(&mut store, 0)?;

    {
        let mut unit = store.unit()?;
        unit.delete_list(list.list_id)?;
    }

    assert!(store.get_list(list.list_id)?.is_some());
    Ok(())
}

#[test]
fn racing_writers_on_one_file_have_exactly_one_winner() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("race.db");
    let path = path.to_str().ok_or("non-utf8 temp path")?.to_string();

    let mut store = SqliteStore::open(&path)?;
    let (_, items) = seed(&mut store, 1)?;
    let item = items[0].clone();

    let barrier = Barrier::new(2);
    let outcomes: Vec<CasOutcome<ItemRecord>> = std::thread::scope(|s| {
        let handles: Vec<_> = [1.0, 9.0]
            .into_iter()
            .map(|qty| {
                let barrier = &barrier;
                let path = &path;
                let item = &item;
                s.spawn(move || -> Result<CasOutcome<ItemRecord>, StorageError> {
                    let mut store = SqliteStore::open(path)?;
                    let mut clock = Clock::new();
                    let mut next = item.clone();
                    next.quantity = Quantity::new(qty, Quantity::DEFAULT_MAX).unwrap();
                    next.updated_at = clock.tick()?;
                    barrier.wait();
                    let mut unit = store.unit()?;
                    let outcome = unit.cas_item(&next, 0)?;
                    unit.commit()?;
                    Ok(outcome)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("writer thread panicked"))
            .collect::<Result<Vec<_>, _>>()
    })?;

    let winners: Vec<&ItemRecord> = outcomes
        .iter()
        .filter_map(|o| match o {
            CasOutcome::Applied(stored) => Some(stored),
            _ => None,
        })
        .collect();
    assert_eq!(winners.len(), 1, "outcomes: {outcomes:?}");
    assert!(outcomes.contains(&CasOutcome::Stale { current_version: 1 }));

    let stored = store.get_item(item.item_id)?.unwrap();
    assert_eq!(stored.version, 1);
    assert_eq!(stored.quantity, winners[0].quantity);
    Ok(())
}
