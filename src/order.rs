//! Orders and the lifecycle state machine that drives them
use super::context::{StateContext, get_record, put_record};
use super::error::{CustodyError, RecordKind};
use super::ledger::{ContextKey, Transaction, TransactionDraft, TransactionKind, TransactionLedger};
use super::medicine::{EntityRegistry, MedicineStatus};
use super::types::require_text;
use super::utils;
use std::fmt;
use std::str::FromStr;

pub const ORDER_PREFIX: &str = "order/";

pub fn order_key(id: &str) -> String {
    format!("{ORDER_PREFIX}{id}")
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, minicbor::Encode, minicbor::Decode)]
pub enum OrderStatus {
    #[n(0)]
    Placed,
    #[n(1)]
    Confirmed,
    #[n(2)]
    Delivered,
    #[n(3)]
    Cancelled,
}

impl OrderStatus {
    /// Edges of the lifecycle. Everything not listed is rejected.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Placed, OrderStatus::Confirmed)
                | (OrderStatus::Confirmed, OrderStatus::Delivered)
                | (OrderStatus::Placed, OrderStatus::Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OrderStatus::Placed => "Placed",
            OrderStatus::Confirmed => "Confirmed",
            OrderStatus::Delivered => "Delivered",
            OrderStatus::Cancelled => "Cancelled",
        };
        f.write_str(name)
    }
}

impl FromStr for OrderStatus {
    type Err = CustodyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Placed" => Ok(OrderStatus::Placed),
            "Confirmed" => Ok(OrderStatus::Confirmed),
            "Delivered" => Ok(OrderStatus::Delivered),
            "Cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(CustodyError::validation(
                "status",
                format!("'{other}' is not an order status"),
            )),
        }
    }
}

// Key is `order/{id}`, the id being the invocation that created the order
#[derive(Debug, PartialEq, Eq, Clone, minicbor::Encode, minicbor::Decode)]
#[cbor(map)]
pub struct Order {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub medicine_id: String,
    #[n(2)]
    pub seller_id: String,
    #[n(3)]
    pub buyer_id: String,
    #[n(4)]
    pub quantity: u64,
    #[n(5)]
    pub status: OrderStatus,
    #[n(6)]
    pub owner: String, // custodian of the consignment
    #[n(7)]
    pub current_hash: String, // head of the custody hash chain
    #[n(8)]
    pub transactions: Vec<Transaction>,
}

impl Order {
    /// Moves the order along one edge of the lifecycle.
    pub fn transition(&mut self, next: OrderStatus) -> Result<(), CustodyError> {
        if !self.status.can_transition_to(next) {
            return Err(CustodyError::InvalidTransition {
                key: self.id.clone(),
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn require_seller(&self, caller_id: &str) -> Result<(), CustodyError> {
        if caller_id != self.seller_id {
            return Err(CustodyError::Unauthorized {
                caller: caller_id.to_string(),
                required: self.seller_id.clone(),
            });
        }
        Ok(())
    }

    /// Accepts either the seller or the buyer.
    pub fn require_party(&self, caller_id: &str) -> Result<(), CustodyError> {
        if caller_id != self.seller_id && caller_id != self.buyer_id {
            return Err(CustodyError::Unauthorized {
                caller: caller_id.to_string(),
                required: format!("{} or {}", self.seller_id, self.buyer_id),
            });
        }
        Ok(())
    }
}

pub struct OrderLifecycle;

impl OrderLifecycle {
    pub fn place_order<C: StateContext + ?Sized>(
        ctx: &mut C,
        medicine_id: &str,
        seller_id: &str,
        buyer_id: &str,
        quantity: u64,
    ) -> Result<String, CustodyError> {
        let order = Self::open(
            ctx,
            medicine_id,
            seller_id,
            buyer_id,
            quantity,
            OrderStatus::Placed,
            seller_id,
        )?;

        tracing::info!(
            order_id = %order.id,
            medicine_id = %medicine_id,
            seller = %seller_id,
            buyer = %buyer_id,
            quantity,
            "placed order"
        );
        Ok(order.id)
    }

    /// Records units that left a lot by direct transfer as a settled order.
    /// It is written already Delivered and owned by `buyer_id`, so the moved
    /// quantity stays attached to a custody record with a frozen hash.
    pub fn anchor_transfer<C: StateContext + ?Sized>(
        ctx: &mut C,
        medicine_id: &str,
        seller_id: &str,
        buyer_id: &str,
        quantity: u64,
    ) -> Result<Order, CustodyError> {
        let order = Self::open(
            ctx,
            medicine_id,
            seller_id,
            buyer_id,
            quantity,
            OrderStatus::Delivered,
            buyer_id,
        )?;

        tracing::info!(
            order_id = %order.id,
            medicine_id = %medicine_id,
            owner = %buyer_id,
            quantity,
            "anchored transferred units"
        );
        Ok(order)
    }

    // order id is the invocation id, so one invocation opens at most one order
    fn open<C: StateContext + ?Sized>(
        ctx: &mut C,
        medicine_id: &str,
        seller_id: &str,
        buyer_id: &str,
        quantity: u64,
        status: OrderStatus,
        owner: &str,
    ) -> Result<Order, CustodyError> {
        if quantity == 0 {
            return Err(CustodyError::validation("quantity", "must be greater than zero"));
        }
        require_text("seller", seller_id)?;
        require_text("buyer", buyer_id)?;
        EntityRegistry::get(ctx, medicine_id)?;

        let id = ctx.invocation_id().to_string();
        let key = order_key(&id);
        if ctx.get_state(&key)?.is_some() {
            return Err(CustodyError::AlreadyExists {
                kind: RecordKind::Order,
                key: id,
            });
        }

        let mut order = Order {
            id,
            medicine_id: medicine_id.to_string(),
            seller_id: seller_id.to_string(),
            buyer_id: buyer_id.to_string(),
            quantity,
            status,
            owner: owner.to_string(),
            current_hash: String::new(),
            transactions: vec![],
        };
        // genesis commitment: digest of the order as first written
        let (genesis, _) = utils::digest_cbor(&order)
            .map_err(|err| CustodyError::Serialization(err.to_string()))?;
        order.current_hash = genesis;

        put_record(ctx, &key, &order)?;
        Ok(order)
    }

    /// Placed -> Confirmed, by the seller only.
    pub fn confirm_order<C: StateContext + ?Sized>(
        ctx: &mut C,
        order_id: &str,
        caller_id: &str,
    ) -> Result<(), CustodyError> {
        let mut order = Self::get_order(ctx, order_id)?;
        order.require_seller(caller_id)?;
        order.transition(OrderStatus::Confirmed)?;
        Self::save(ctx, &order)?;

        tracing::info!(order_id = %order_id, "confirmed order");
        Ok(())
    }

    /// Completes an order on physical receipt. The order, the lot and the
    /// delivery record are written through one context so they commit together.
    pub fn receive_medicine<C: StateContext + ?Sized>(
        ctx: &mut C,
        medicine_id: &str,
        order_id: &str,
        receiver_id: &str,
    ) -> Result<(), CustodyError> {
        let mut order = Self::get_order(ctx, order_id)?;
        let mut medicine = EntityRegistry::get(ctx, medicine_id)?;

        if order.medicine_id != medicine.id {
            return Err(CustodyError::validation(
                "medicine",
                format!("order {order_id} is for '{}'", order.medicine_id),
            ));
        }
        if receiver_id != order.buyer_id {
            return Err(CustodyError::Unauthorized {
                caller: receiver_id.to_string(),
                required: order.buyer_id.clone(),
            });
        }
        order.transition(OrderStatus::Delivered)?;
        if order.quantity > medicine.quantity {
            return Err(CustodyError::InsufficientQuantity {
                key: medicine.id.clone(),
                requested: order.quantity,
                available: medicine.quantity,
            });
        }

        medicine.quantity -= order.quantity;
        medicine.current_owner = receiver_id.to_string();
        medicine.status = MedicineStatus::Delivered;
        order.owner = receiver_id.to_string();

        EntityRegistry::save(ctx, &medicine)?;
        Self::save(ctx, &order)?;
        TransactionLedger::append(
            ctx,
            &ContextKey::Order(order.id.clone()),
            TransactionDraft {
                kind: TransactionKind::Delivery,
                quantity: order.quantity,
                source: order.seller_id.clone(),
                destination: receiver_id.to_string(),
            },
        )?;

        tracing::info!(
            order_id = %order_id,
            medicine_id = %medicine_id,
            receiver = %receiver_id,
            remaining = medicine.quantity,
            "delivered order"
        );
        Ok(())
    }

    /// Opens a resale order for a lot the caller currently owns.
    pub fn sell_medicine<C: StateContext + ?Sized>(
        ctx: &mut C,
        medicine_id: &str,
        buyer_id: &str,
        quantity: u64,
        caller_id: &str,
    ) -> Result<String, CustodyError> {
        let medicine = EntityRegistry::get(ctx, medicine_id)?;
        if caller_id != medicine.current_owner {
            return Err(CustodyError::Unauthorized {
                caller: caller_id.to_string(),
                required: medicine.current_owner,
            });
        }
        if quantity > medicine.quantity {
            return Err(CustodyError::InsufficientQuantity {
                key: medicine.id,
                requested: quantity,
                available: medicine.quantity,
            });
        }

        Self::place_order(ctx, medicine_id, caller_id, buyer_id, quantity)
    }

    pub fn get_order<C: StateContext + ?Sized>(
        ctx: &mut C,
        order_id: &str,
    ) -> Result<Order, CustodyError> {
        get_record(ctx, &order_key(order_id))?
            .ok_or_else(|| CustodyError::not_found(RecordKind::Order, order_id))
    }

    pub fn save<C: StateContext + ?Sized>(ctx: &mut C, order: &Order) -> Result<(), CustodyError> {
        put_record(ctx, &order_key(&order.id), order)
    }

    /// Explicit status change. Delivery needs the lot handoff, so it is only
    /// reachable through [`OrderLifecycle::receive_medicine`]. Confirmation
    /// is the seller's; cancellation may come from either party.
    pub fn update_order_status<C: StateContext + ?Sized>(
        ctx: &mut C,
        order_id: &str,
        status: OrderStatus,
        caller_id: &str,
    ) -> Result<(), CustodyError> {
        let mut order = Self::get_order(ctx, order_id)?;
        match status {
            OrderStatus::Confirmed => order.require_seller(caller_id)?,
            _ => order.require_party(caller_id)?,
        }
        if status == OrderStatus::Delivered {
            return Err(CustodyError::InvalidTransition {
                key: order.id,
                from: order.status.to_string(),
                to: "Delivered without receipt".to_string(),
            });
        }
        order.transition(status)?;
        Self::save(ctx, &order)?;

        tracing::info!(order_id = %order_id, status = %status, "updated order status");
        Ok(())
    }

    /// Records a payment against an order.
    pub fn add_payment<C: StateContext + ?Sized>(
        ctx: &mut C,
        order_id: &str,
        amount: u64,
        payment_method: &str,
    ) -> Result<String, CustodyError> {
        if amount == 0 {
            return Err(CustodyError::validation("amount", "must be greater than zero"));
        }
        require_text("payment method", payment_method)?;

        let order = Self::get_order(ctx, order_id)?;
        if order.status == OrderStatus::Cancelled {
            return Err(CustodyError::InvalidTransition {
                key: order.id,
                from: order.status.to_string(),
                to: "Paid".to_string(),
            });
        }

        let payer = ctx.caller_identity().to_string();
        TransactionLedger::append(
            ctx,
            &ContextKey::Order(order.id),
            TransactionDraft {
                kind: TransactionKind::Payment {
                    payment_method: payment_method.to_string(),
                },
                quantity: amount,
                source: payer,
                destination: order.seller_id,
            },
        )
    }
}
