//! Sample inventory domain used across the workspace's tests.

use esfacade_core::aggregate::Aggregate;
use esfacade_core::codec::EventCodec;
use esfacade_core::event::DomainEvent;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Aggregate type name of [`InventoryItem`].
pub const INVENTORY_ITEM: &str = "inventory_item";

/// Emitted when an item is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemCreated {
    /// The item identifier.
    pub item_id: Uuid,
    /// Initial display name.
    pub name: String,
}

/// Emitted when an item is renamed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRenamed {
    /// The item identifier.
    pub item_id: Uuid,
    /// New display name.
    pub new_name: String,
}

/// Emitted when stock is checked in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemsCheckedIn {
    /// The item identifier.
    pub item_id: Uuid,
    /// Units added.
    pub count: u32,
}

/// Emitted when an item is deactivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDeactivated {
    /// The item identifier.
    pub item_id: Uuid,
}

/// Event payload variants for inventory items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InventoryEvent {
    /// An item was created.
    Created(ItemCreated),
    /// An item was renamed.
    Renamed(ItemRenamed),
    /// Stock was checked in.
    CheckedIn(ItemsCheckedIn),
    /// An item was deactivated.
    Deactivated(ItemDeactivated),
}

impl InventoryEvent {
    /// Shorthand for an `ItemCreated` event.
    #[must_use]
    pub fn created(item_id: Uuid, name: &str) -> Self {
        Self::Created(ItemCreated {
            item_id,
            name: name.to_owned(),
        })
    }

    /// Shorthand for an `ItemRenamed` event.
    #[must_use]
    pub fn renamed(item_id: Uuid, new_name: &str) -> Self {
        Self::Renamed(ItemRenamed {
            item_id,
            new_name: new_name.to_owned(),
        })
    }

    /// Shorthand for an `ItemsCheckedIn` event.
    #[must_use]
    pub fn checked_in(item_id: Uuid, count: u32) -> Self {
        Self::CheckedIn(ItemsCheckedIn { item_id, count })
    }
}

impl DomainEvent for InventoryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            Self::Created(_) => "inventory.item_created",
            Self::Renamed(_) => "inventory.item_renamed",
            Self::CheckedIn(_) => "inventory.items_checked_in",
            Self::Deactivated(_) => "inventory.item_deactivated",
        }
    }

    fn to_payload(&self) -> serde_json::Value {
        // Serialization of derived Serialize types to Value is infallible.
        let value = match self {
            Self::Created(e) => serde_json::to_value(e),
            Self::Renamed(e) => serde_json::to_value(e),
            Self::CheckedIn(e) => serde_json::to_value(e),
            Self::Deactivated(e) => serde_json::to_value(e),
        };
        value.expect("InventoryEvent serialization is infallible")
    }
}

/// Codec registering every [`InventoryEvent`] variant.
#[must_use]
pub fn inventory_codec() -> EventCodec<InventoryEvent> {
    EventCodec::new()
        .register("inventory.item_created", InventoryEvent::Created)
        .register("inventory.item_renamed", InventoryEvent::Renamed)
        .register("inventory.items_checked_in", InventoryEvent::CheckedIn)
        .register("inventory.item_deactivated", InventoryEvent::Deactivated)
}

/// Inventory item state rebuilt from its events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryItem {
    /// The item identifier.
    pub id: Uuid,
    /// Current display name.
    pub name: String,
    /// Units in stock.
    pub stock: u32,
    /// Whether the item is still active.
    pub active: bool,
}

impl Aggregate for InventoryItem {
    const AGGREGATE_TYPE: &'static str = INVENTORY_ITEM;
    type Event = InventoryEvent;

    fn new(id: Uuid) -> Self {
        Self {
            id,
            name: String::new(),
            stock: 0,
            active: false,
        }
    }

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InventoryEvent::Created(e) => {
                self.name.clone_from(&e.name);
                self.active = true;
            }
            InventoryEvent::Renamed(e) => self.name.clone_from(&e.new_name),
            InventoryEvent::CheckedIn(e) => self.stock += e.count,
            InventoryEvent::Deactivated(_) => self.active = false,
        }
    }
}
