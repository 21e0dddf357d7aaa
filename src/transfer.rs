//! Custody transfers: quantity moves between owners and verified hash-chain
//! handoffs on orders.
//!
//! A handoff presents a credential that must verify against the order's
//! current hash. Verification happens before anything is written, so a
//! rejected credential leaves the order exactly as it was.
use super::context::StateContext;
use super::error::CustodyError;
use super::ledger::{ContextKey, TransactionDraft, TransactionKind, TransactionLedger};
use super::medicine::EntityRegistry;
use super::order::OrderLifecycle;
use super::types::{ContentHash, require_text};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;
use std::str::FromStr;

type HmacSha256 = Hmac<Sha256>;

/// Proof of possession presented by the next custodian, typically read from
/// the consignment's tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub holder: String,
    pub tag: Vec<u8>,
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.holder, hex::encode(&self.tag))
    }
}

impl FromStr for Credential {
    type Err = CustodyError;

    // `holder:hex(tag)`, split at the last ':' so holders may contain ':'
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (holder, tag) = s
            .rsplit_once(':')
            .ok_or_else(|| CustodyError::validation("credential", "expected holder:tag"))?;
        require_text("credential holder", holder)?;
        let tag = hex::decode(tag)
            .map_err(|err| CustodyError::validation("credential tag", err.to_string()))?;

        Ok(Credential {
            holder: holder.to_string(),
            tag,
        })
    }
}

/// The external trust collaborator deciding whether a credential may advance
/// a custody chain whose head is `current_hash`.
pub trait CredentialVerifier {
    fn verify(&self, current_hash: &str, credential: &Credential) -> bool;
}

/// Keyed-hash verifier: tags are HMAC-SHA256 over the chain head and holder
/// under a secret shared with the tag writers.
#[derive(Clone)]
pub struct HmacTagVerifier {
    secret: Vec<u8>,
}

impl HmacTagVerifier {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    fn mac(&self, current_hash: &str, holder: &str) -> Option<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.secret).ok()?;
        mac.update(current_hash.as_bytes());
        mac.update(&[0]);
        mac.update(holder.as_bytes());
        Some(mac)
    }

    /// Writes a credential for `holder` against the given chain head.
    pub fn issue(&self, current_hash: &str, holder: &str) -> Option<Credential> {
        let tag = self.mac(current_hash, holder)?.finalize().into_bytes().to_vec();
        Some(Credential {
            holder: holder.to_string(),
            tag,
        })
    }
}

impl fmt::Debug for HmacTagVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HmacTagVerifier").finish_non_exhaustive()
    }
}

impl CredentialVerifier for HmacTagVerifier {
    fn verify(&self, current_hash: &str, credential: &Credential) -> bool {
        match self.mac(current_hash, &credential.holder) {
            Some(mac) => mac.verify_slice(&credential.tag).is_ok(),
            None => false,
        }
    }
}

pub struct OwnershipTransferEngine;

impl OwnershipTransferEngine {
    /// Moves `quantity` units of a lot from its owner to `new_owner`. The lot
    /// changes hands as a whole only when every remaining unit moves. A partial
    /// transfer opens a settled anchor order, keyed by the invocation id, that
    /// holds the moved units for `new_owner`.
    pub fn transfer<C: StateContext + ?Sized>(
        ctx: &mut C,
        medicine_id: &str,
        caller_id: &str,
        new_owner_id: &str,
        quantity: u64,
    ) -> Result<String, CustodyError> {
        let mut medicine = EntityRegistry::get(ctx, medicine_id)?;

        if caller_id != medicine.current_owner {
            return Err(CustodyError::Unauthorized {
                caller: caller_id.to_string(),
                required: medicine.current_owner,
            });
        }
        if quantity == 0 || quantity > medicine.quantity {
            return Err(CustodyError::InsufficientQuantity {
                key: medicine.id,
                requested: quantity,
                available: medicine.quantity,
            });
        }
        require_text("new owner", new_owner_id)?;

        let whole_lot = quantity == medicine.quantity;
        medicine.quantity -= quantity;
        if whole_lot {
            medicine.current_owner = new_owner_id.to_string();
        }
        EntityRegistry::save(ctx, &medicine)?;

        let draft = TransactionDraft {
            kind: TransactionKind::Transfer,
            quantity,
            source: caller_id.to_string(),
            destination: new_owner_id.to_string(),
        };
        if !whole_lot {
            let anchor = OrderLifecycle::anchor_transfer(
                ctx,
                &medicine.id,
                caller_id,
                new_owner_id,
                quantity,
            )?;
            TransactionLedger::append(ctx, &ContextKey::Order(anchor.id), draft.clone())?;
        }
        let transaction_id =
            TransactionLedger::append(ctx, &ContextKey::Medicine(medicine.id.clone()), draft)?;

        tracing::info!(
            medicine_id = %medicine_id,
            from = %caller_id,
            to = %new_owner_id,
            quantity,
            remaining = medicine.quantity,
            whole_lot,
            "transferred medicine"
        );
        Ok(transaction_id)
    }

    /// Advances an order's custody chain to `new_hash` for the credential's
    /// holder.
    pub fn change_ownership<C, V>(
        ctx: &mut C,
        verifier: &V,
        order_id: &str,
        new_hash: &ContentHash,
        credential: &Credential,
    ) -> Result<(), CustodyError>
    where
        C: StateContext + ?Sized,
        V: CredentialVerifier + ?Sized,
    {
        let mut order = OrderLifecycle::get_order(ctx, order_id)?;

        if order.status.is_terminal() {
            return Err(CustodyError::InvalidTransition {
                key: order.id,
                from: order.status.to_string(),
                to: "custody change".to_string(),
            });
        }
        if new_hash.as_str() == order.current_hash {
            return Err(CustodyError::validation(
                "new hash",
                "must differ from the current custody hash",
            ));
        }
        if !verifier.verify(&order.current_hash, credential) {
            tracing::warn!(order_id = %order_id, holder = %credential.holder, "credential rejected");
            return Err(CustodyError::Integrity { key: order.id });
        }

        let prior_hash = std::mem::replace(&mut order.current_hash, new_hash.to_string());
        let prior_owner = std::mem::replace(&mut order.owner, credential.holder.clone());
        OrderLifecycle::save(ctx, &order)?;
        TransactionLedger::append(
            ctx,
            &ContextKey::Order(order.id.clone()),
            TransactionDraft {
                kind: TransactionKind::Custody {
                    prior_hash,
                    new_hash: new_hash.to_string(),
                },
                quantity: order.quantity,
                source: prior_owner,
                destination: credential.holder.clone(),
            },
        )?;

        tracing::info!(order_id = %order_id, owner = %credential.holder, "custody changed");
        Ok(())
    }
}
