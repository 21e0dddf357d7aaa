//! Append-only transaction records for orders and medicine lots
use super::context::{StateContext, get_record, put_record};
use super::error::{CustodyError, RecordKind};
use super::medicine::EntityRegistry;
use super::order::OrderLifecycle;
use super::types::LogicalTimestamp;
use super::utils;
use std::fmt;

pub const HISTORY_PREFIX: &str = "history/";

pub fn history_key(medicine_id: &str) -> String {
    format!("{HISTORY_PREFIX}{medicine_id}")
}

/// The record a transaction is appended to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextKey {
    Order(String),
    Medicine(String),
}

impl ContextKey {
    pub fn id(&self) -> &str {
        match self {
            ContextKey::Order(id) | ContextKey::Medicine(id) => id,
        }
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextKey::Order(id) => write!(f, "order/{id}"),
            ContextKey::Medicine(id) => write!(f, "history/{id}"),
        }
    }
}

#[derive(Debug, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Clone)]
pub enum TransactionKind {
    #[n(0)]
    Transfer,
    #[n(1)]
    Delivery,
    #[n(2)]
    Payment {
        #[n(0)]
        payment_method: String,
    },
    #[n(3)]
    Custody {
        #[n(0)]
        prior_hash: String,
        #[n(1)]
        new_hash: String,
    },
}

#[derive(Debug, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Clone)]
#[cbor(map)]
pub struct Transaction {
    #[n(0)]
    pub transaction_id: String,
    #[n(1)]
    pub context_key: String, // order or medicine id
    #[n(2)]
    pub kind: TransactionKind,
    #[n(3)]
    pub quantity: u64, // units moved, or the amount for payments
    #[n(4)]
    pub source: String,
    #[n(5)]
    pub destination: String,
    #[n(6)]
    pub timestamp: LogicalTimestamp,
    #[n(7)]
    pub invocation_id: String,
}

/// The caller-supplied part of a transaction. Identity, time and id are
/// filled in from the invocation context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionDraft {
    pub kind: TransactionKind,
    pub quantity: u64,
    pub source: String,
    pub destination: String,
}

// Key is `history/{medicine_id}`
#[derive(Debug, Default, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Clone)]
#[cbor(map)]
pub struct MedicineHistory {
    #[n(0)]
    pub medicine_id: String,
    #[n(1)]
    pub entries: Vec<Transaction>,
}

pub struct TransactionLedger;

impl TransactionLedger {
    /// Appends a transaction to the order or lot named by `context` and returns
    /// its id. Existing entries are never rewritten.
    pub fn append<C: StateContext + ?Sized>(
        ctx: &mut C,
        context: &ContextKey,
        draft: TransactionDraft,
    ) -> Result<String, CustodyError> {
        let transaction_id = match context {
            ContextKey::Order(order_id) => {
                let mut order = OrderLifecycle::get_order(ctx, order_id)?;
                let transaction = Self::seal(ctx, context, order.transactions.len(), draft)?;
                let id = transaction.transaction_id.clone();
                order.transactions.push(transaction);
                OrderLifecycle::save(ctx, &order)?;
                id
            }
            ContextKey::Medicine(medicine_id) => {
                EntityRegistry::get(ctx, medicine_id)?;
                let key = history_key(medicine_id);
                let mut history = get_record::<MedicineHistory, _>(ctx, &key)?.unwrap_or_else(|| {
                    MedicineHistory {
                        medicine_id: medicine_id.clone(),
                        entries: vec![],
                    }
                });
                let transaction = Self::seal(ctx, context, history.entries.len(), draft)?;
                let id = transaction.transaction_id.clone();
                history.entries.push(transaction);
                put_record(ctx, &key, &history)?;
                id
            }
        };

        tracing::info!(
            context = %context,
            transaction_id = %transaction_id,
            invocation_id = %ctx.invocation_id(),
            "appended transaction"
        );
        Ok(transaction_id)
    }

    /// Transactions of an order or lot in commit order.
    pub fn list_for<C: StateContext + ?Sized>(
        ctx: &mut C,
        context: &ContextKey,
    ) -> Result<Vec<Transaction>, CustodyError> {
        match context {
            ContextKey::Order(order_id) => Ok(OrderLifecycle::get_order(ctx, order_id)?.transactions),
            ContextKey::Medicine(medicine_id) => {
                EntityRegistry::get(ctx, medicine_id)?;
                let history = get_record::<MedicineHistory, _>(ctx, &history_key(medicine_id))?;
                Ok(history.map(|h| h.entries).unwrap_or_default())
            }
        }
    }

    // the id is a digest of invocation, context and position so every replica
    // derives the same value
    fn seal<C: StateContext + ?Sized>(
        ctx: &C,
        context: &ContextKey,
        position: usize,
        draft: TransactionDraft,
    ) -> Result<Transaction, CustodyError> {
        let seed = format!("{}/{}/{}", ctx.invocation_id(), context, position);
        let transaction_id = utils::derive_bech32_id("txn", &seed).map_err(|err| {
            CustodyError::Serialization(format!("transaction id for {context}: {err}"))
        })?;

        Ok(Transaction {
            transaction_id,
            context_key: context.id().to_string(),
            kind: draft.kind,
            quantity: draft.quantity,
            source: draft.source,
            destination: draft.destination,
            timestamp: ctx.logical_timestamp(),
            invocation_id: ctx.invocation_id().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Invocation, InvocationHeader, WorldMap};
    use crate::medicine::{MedicineStatus, NewMedicine};

    fn register(ctx: &mut impl StateContext) {
        EntityRegistry::register(
            ctx,
            NewMedicine {
                id: "M1".into(),
                name: "Paracetamol".into(),
                manufacturer: "Mfg1".into(),
                location: "Plant A".into(),
                status: MedicineStatus::Registered,
                owner: "Mfg1".into(),
                quantity: 10,
            },
        )
        .unwrap();
    }

    fn draft(quantity: u64) -> TransactionDraft {
        TransactionDraft {
            kind: TransactionKind::Transfer,
            quantity,
            source: "Mfg1".into(),
            destination: "Dist1".into(),
        }
    }

    #[test]
    fn medicine_history_appends_in_order() {
        let world = WorldMap::new();
        let header = InvocationHeader::new("Mfg1", "inv_a", LogicalTimestamp::new(3));
        let mut ctx = Invocation::new(header, &world);
        register(&mut ctx);

        let context = ContextKey::Medicine("M1".into());
        let first = TransactionLedger::append(&mut ctx, &context, draft(1)).unwrap();
        let second = TransactionLedger::append(&mut ctx, &context, draft(2)).unwrap();

        let entries = TransactionLedger::list_for(&mut ctx, &context).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].transaction_id, first);
        assert_eq!(entries[1].transaction_id, second);
        assert_ne!(first, second);
        assert_eq!(entries[1].quantity, 2);
        assert_eq!(entries[0].timestamp, LogicalTimestamp::new(3));
        assert_eq!(entries[0].context_key, "M1");
    }

    #[test]
    fn ids_depend_only_on_invocation_and_position() {
        let ids: Vec<String> = (0..2)
            .map(|_| {
                let world = WorldMap::new();
                let header = InvocationHeader::new("Mfg1", "inv_same", LogicalTimestamp::new(1));
                let mut ctx = Invocation::new(header, &world);
                register(&mut ctx);
                TransactionLedger::append(&mut ctx, &ContextKey::Medicine("M1".into()), draft(1))
                    .unwrap()
            })
            .collect();

        assert_eq!(ids[0], ids[1]);
    }

    #[test]
    fn unknown_medicine_has_no_history() {
        let world = WorldMap::new();
        let header = InvocationHeader::new("Mfg1", "inv_b", LogicalTimestamp::new(1));
        let mut ctx = Invocation::new(header, &world);

        let err = TransactionLedger::append(&mut ctx, &ContextKey::Medicine("M9".into()), draft(1))
            .unwrap_err();
        assert_eq!(err, CustodyError::not_found(RecordKind::Medicine, "M9"));
    }

    #[test]
    fn registered_medicine_starts_with_empty_history() {
        let world = WorldMap::new();
        let header = InvocationHeader::new("Mfg1", "inv_c", LogicalTimestamp::new(1));
        let mut ctx = Invocation::new(header, &world);
        register(&mut ctx);

        let entries = TransactionLedger::list_for(&mut ctx, &ContextKey::Medicine("M1".into()));
        assert!(entries.unwrap().is_empty());
    }
}
