//! crates/reminders_core/src/cart.rs
//!
//! The shopping cart and the order history it feeds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

//=========================================================================================
// Cart Items
//=========================================================================================

/// Anything purchasable: a service, a dish, a recipe, a chef, a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRef {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub unit_price: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorRef {
    pub id: String,
    pub name: String,
}

/// The five shapes a cart row can take.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CartItem {
    Service {
        service: ItemRef,
        quantity: u32,
    },
    PreparedDish {
        dish: ItemRef,
        vendor: VendorRef,
        quantity: u32,
    },
    /// A shopping list for a recipe. The vendor prices it, so it adds nothing to the total.
    Ingredients {
        recipe: ItemRef,
        ingredients: Vec<String>,
        #[serde(default)]
        vendor: Option<VendorRef>,
    },
    ChefService {
        chef: ItemRef,
        price: f64,
    },
    VendorProduct {
        product: ItemRef,
        vendor: VendorRef,
        quantity: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Kind {
    Service,
    PreparedDish,
    Ingredients,
    ChefService,
    VendorProduct,
}

/// Two rows with equal keys are the same purchase.
#[derive(Debug, PartialEq, Eq)]
struct MergeKey<'a> {
    kind: Kind,
    item_id: &'a str,
    vendor_id: Option<&'a str>,
}

impl CartItem {
    fn kind(&self) -> Kind {
        match self {
            CartItem::Service { .. } => Kind::Service,
            CartItem::PreparedDish { .. } => Kind::PreparedDish,
            CartItem::Ingredients { .. } => Kind::Ingredients,
            CartItem::ChefService { .. } => Kind::ChefService,
            CartItem::VendorProduct { .. } => Kind::VendorProduct,
        }
    }

    pub fn item(&self) -> &ItemRef {
        match self {
            CartItem::Service { service, .. } => service,
            CartItem::PreparedDish { dish, .. } => dish,
            CartItem::Ingredients { recipe, .. } => recipe,
            CartItem::ChefService { chef, .. } => chef,
            CartItem::VendorProduct { product, .. } => product,
        }
    }

    /// `None` for the variants that are bought once.
    pub fn quantity(&self) -> Option<u32> {
        match self {
            CartItem::Service { quantity, .. }
            | CartItem::PreparedDish { quantity, .. }
            | CartItem::VendorProduct { quantity, .. } => Some(*quantity),
            CartItem::Ingredients { .. } | CartItem::ChefService { .. } => None,
        }
    }

    fn quantity_mut(&mut self) -> Option<&mut u32> {
        match self {
            CartItem::Service { quantity, .. }
            | CartItem::PreparedDish { quantity, .. }
            | CartItem::VendorProduct { quantity, .. } => Some(quantity),
            CartItem::Ingredients { .. } | CartItem::ChefService { .. } => None,
        }
    }

    /// What this row adds to the order total.
    pub fn contribution(&self) -> f64 {
        match self {
            CartItem::Service { service: item, quantity }
            | CartItem::PreparedDish { dish: item, quantity, .. }
            | CartItem::VendorProduct { product: item, quantity, .. } => {
                item.unit_price * f64::from(*quantity)
            }
            CartItem::ChefService { price, .. } => *price,
            CartItem::Ingredients { .. } => 0.0,
        }
    }

    /// Rejects prices that would make the order total negative or NaN.
    fn check_prices(&self) -> Result<(), CartError> {
        check_price(self.item().unit_price)?;
        if let CartItem::ChefService { price, .. } = self {
            check_price(*price)?;
        }
        Ok(())
    }

    fn merge_key(&self) -> MergeKey<'_> {
        let vendor_id = match self {
            CartItem::PreparedDish { vendor, .. } | CartItem::VendorProduct { vendor, .. } => {
                Some(vendor.id.as_str())
            }
            CartItem::Service { .. }
            | CartItem::Ingredients { .. }
            | CartItem::ChefService { .. } => None,
        };
        MergeKey {
            kind: self.kind(),
            item_id: &self.item().id,
            vendor_id,
        }
    }
}

/// One row of the cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    pub id: Uuid,
    pub item: CartItem,
    pub added_at: DateTime<Utc>,
}

/// What `Cart::add_item` did with the item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "line_id", rename_all = "snake_case")]
pub enum AddOutcome {
    Added(Uuid),
    /// The quantity of an existing row was increased.
    Merged(Uuid),
    /// A once-only item was already in the cart.
    Ignored(Uuid),
}

/// A partial edit of a cart row. Fields that do not apply to the row's variant are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CartItemUpdate {
    #[serde(default)]
    pub quantity: Option<u32>,
    #[serde(default)]
    pub vendor: Option<VendorRef>,
    #[serde(default)]
    pub price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LineUpdate {
    Updated(CartLine),
    /// The quantity was set to zero.
    Removed(CartLine),
}

//=========================================================================================
// Orders
//=========================================================================================

/// A checkout snapshot. Never changes once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    /// Lets a backend drop the duplicate when a checkout request is retried.
    pub idempotency_key: Uuid,
    pub lines: Vec<CartLine>,
    pub total: f64,
    #[serde(default)]
    pub reminder_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CartError {
    #[error("The cart is empty")]
    Empty,
    #[error("Prices must be finite and not negative")]
    InvalidPrice,
}

fn check_price(price: f64) -> Result<(), CartError> {
    if price.is_finite() && price >= 0.0 {
        Ok(())
    } else {
        Err(CartError::InvalidPrice)
    }
}

//=========================================================================================
// Cart
//=========================================================================================

#[derive(Debug, Clone, Default)]
pub struct Cart {
    lines: Vec<CartLine>,
    /// Newest first.
    orders: Vec<Order>,
    /// The last prepared order that was not committed. A retry over the same
    /// lines gets it back with the same id and idempotency key.
    pending: Option<Order>,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the cart contents and the order history, e.g. after loading them.
    pub fn restore(&mut self, lines: Vec<CartLine>, mut orders: Vec<Order>) {
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        self.lines = lines;
        self.orders = orders;
        self.pending = None;
    }

    pub fn add_item(
        &mut self,
        mut item: CartItem,
        now: DateTime<Utc>,
    ) -> Result<AddOutcome, CartError> {
        item.check_prices()?;
        if let Some(quantity) = item.quantity_mut() {
            *quantity = (*quantity).max(1);
        }

        let existing = self
            .lines
            .iter_mut()
            .find(|line| line.item.merge_key() == item.merge_key());

        if let Some(line) = existing {
            let line_id = line.id;
            return Ok(match (line.item.quantity_mut(), item.quantity()) {
                (Some(current), Some(extra)) => {
                    *current = current.saturating_add(extra);
                    AddOutcome::Merged(line_id)
                }
                _ => AddOutcome::Ignored(line_id),
            });
        }

        let id = Uuid::new_v4();
        self.lines.push(CartLine {
            id,
            item,
            added_at: now,
        });
        Ok(AddOutcome::Added(id))
    }

    pub fn remove_item(&mut self, line_id: Uuid) -> Option<CartLine> {
        let index = self.lines.iter().position(|l| l.id == line_id)?;
        Some(self.lines.remove(index))
    }

    /// `Ok(None)` when no row has that id.
    pub fn update_item(
        &mut self,
        line_id: Uuid,
        update: &CartItemUpdate,
    ) -> Result<Option<LineUpdate>, CartError> {
        if let Some(price) = update.price {
            check_price(price)?;
        }
        let Some(index) = self.lines.iter().position(|l| l.id == line_id) else {
            return Ok(None);
        };
        if update.quantity == Some(0) && self.lines[index].item.quantity().is_some() {
            return Ok(Some(LineUpdate::Removed(self.lines.remove(index))));
        }

        let line = &mut self.lines[index];
        if let (Some(quantity), Some(new_quantity)) = (line.item.quantity_mut(), update.quantity) {
            *quantity = new_quantity;
        }

        if let Some(new_vendor) = &update.vendor {
            match &mut line.item {
                CartItem::PreparedDish { vendor, .. } | CartItem::VendorProduct { vendor, .. } => {
                    *vendor = new_vendor.clone();
                }
                CartItem::Ingredients { vendor, .. } => *vendor = Some(new_vendor.clone()),
                CartItem::Service { .. } | CartItem::ChefService { .. } => {}
            }
        }

        if let (CartItem::ChefService { price, .. }, Some(new_price)) = (&mut line.item, update.price) {
            *price = new_price;
        }

        Ok(Some(LineUpdate::Updated(line.clone())))
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.pending = None;
    }

    pub fn total(&self) -> f64 {
        self.lines.iter().map(|l| l.item.contribution()).sum()
    }

    /// Builds the order checkout would create. The lines and history stay as they are.
    ///
    /// Until it is committed, the prepared order is handed out again for the same
    /// lines and reminder, so a retried checkout reuses its idempotency key. A
    /// caller-supplied key that differs from the pending one starts a new order.
    pub fn prepare_checkout(
        &mut self,
        reminder_id: Option<String>,
        idempotency_key: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<Order, CartError> {
        if self.lines.is_empty() {
            return Err(CartError::Empty);
        }
        if let Some(pending) = &self.pending {
            let same_key = idempotency_key.map_or(true, |key| key == pending.idempotency_key);
            if same_key && pending.lines == self.lines && pending.reminder_id == reminder_id {
                return Ok(pending.clone());
            }
        }
        let order = Order {
            id: Uuid::new_v4(),
            idempotency_key: idempotency_key.unwrap_or_else(Uuid::new_v4),
            lines: self.lines.clone(),
            total: self.total(),
            reminder_id,
            created_at: now,
        };
        self.pending = Some(order.clone());
        Ok(order)
    }

    /// Records a prepared order and empties the cart.
    pub fn commit_checkout(&mut self, order: Order) -> &Order {
        self.lines.clear();
        self.pending = None;
        self.orders.insert(0, order);
        &self.orders[0]
    }

    pub fn checkout(
        &mut self,
        reminder_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<&Order, CartError> {
        let order = self.prepare_checkout(reminder_id, None, now)?;
        Ok(self.commit_checkout(order))
    }

    /// The order already placed under `idempotency_key`, if any.
    pub fn order_by_key(&self, idempotency_key: Uuid) -> Option<&Order> {
        self.orders.iter().find(|o| o.idempotency_key == idempotency_key)
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}
