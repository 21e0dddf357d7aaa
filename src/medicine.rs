//! Registered medicine lots and the registry that owns them
use super::context::{StateContext, get_record, put_record};
use super::error::{CustodyError, RecordKind};
use super::ledger::{ContextKey, Transaction, TransactionLedger};
use super::types::{ContentHash, require_text};
use std::fmt;
use std::str::FromStr;

pub const MEDICINE_PREFIX: &str = "medicine/";

pub fn medicine_key(id: &str) -> String {
    format!("{MEDICINE_PREFIX}{id}")
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MedicineStatus {
    #[n(0)]
    Registered,
    #[n(1)]
    InTransit,
    #[n(2)]
    Delivered,
    #[n(3)]
    Sold,
}

impl fmt::Display for MedicineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MedicineStatus::Registered => "Registered",
            MedicineStatus::InTransit => "InTransit",
            MedicineStatus::Delivered => "Delivered",
            MedicineStatus::Sold => "Sold",
        };
        f.write_str(name)
    }
}

impl FromStr for MedicineStatus {
    type Err = CustodyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Registered" => Ok(MedicineStatus::Registered),
            "InTransit" => Ok(MedicineStatus::InTransit),
            "Delivered" => Ok(MedicineStatus::Delivered),
            "Sold" => Ok(MedicineStatus::Sold),
            other => Err(CustodyError::validation(
                "status",
                format!("'{other}' is not a medicine status"),
            )),
        }
    }
}

// Key is `medicine/{id}`
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
#[cbor(map)]
pub struct Medicine {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub name: String,
    #[n(2)]
    pub manufacturer: String,
    #[n(3)]
    pub location: String,
    #[n(4)]
    pub status: MedicineStatus,
    #[n(5)]
    pub current_owner: String,
    #[n(6)]
    pub quantity: u64,
    #[n(7)]
    pub evidence: Vec<ContentHash>, // certificates, photos; linked by digest only
}

/// Registration input, validated by [`EntityRegistry::register`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMedicine {
    pub id: String,
    pub name: String,
    pub manufacturer: String,
    pub location: String,
    pub status: MedicineStatus,
    pub owner: String,
    pub quantity: u64,
}

/// The closed set of mutations a registered lot accepts outside of custody
/// transfers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MedicineUpdate {
    Location(String),
    Status(MedicineStatus),
    AttachEvidence(ContentHash),
}

impl MedicineUpdate {
    /// Maps a named field update onto a variant. Only `Location` and `Status`
    /// may be set this way.
    pub fn from_field(field: &str, value: &str) -> Result<Self, CustodyError> {
        match field {
            "Location" => Ok(MedicineUpdate::Location(value.to_string())),
            "Status" => Ok(MedicineUpdate::Status(value.parse()?)),
            other => Err(CustodyError::InvalidField(other.to_string())),
        }
    }
}

/// Read model combining a lot with its transfer history.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
#[cbor(map)]
pub struct MedicineDetail {
    #[n(0)]
    pub medicine: Medicine,
    #[n(1)]
    pub transactions: Vec<Transaction>,
}

pub struct EntityRegistry;

impl EntityRegistry {
    pub fn register<C: StateContext + ?Sized>(
        ctx: &mut C,
        new: NewMedicine,
    ) -> Result<String, CustodyError> {
        require_text("id", &new.id)?;
        require_text("name", &new.name)?;
        require_text("manufacturer", &new.manufacturer)?;
        require_text("location", &new.location)?;
        require_text("owner", &new.owner)?;

        let key = medicine_key(&new.id);
        if ctx.get_state(&key)?.is_some() {
            return Err(CustodyError::AlreadyExists {
                kind: RecordKind::Medicine,
                key: new.id,
            });
        }

        let medicine = Medicine {
            id: new.id,
            name: new.name,
            manufacturer: new.manufacturer,
            location: new.location,
            status: new.status,
            current_owner: new.owner,
            quantity: new.quantity,
            evidence: vec![],
        };
        put_record(ctx, &key, &medicine)?;

        tracing::info!(
            medicine_id = %medicine.id,
            owner = %medicine.current_owner,
            quantity = medicine.quantity,
            "registered medicine"
        );
        Ok(medicine.id)
    }

    pub fn get<C: StateContext + ?Sized>(ctx: &mut C, id: &str) -> Result<Medicine, CustodyError> {
        get_record(ctx, &medicine_key(id))?
            .ok_or_else(|| CustodyError::not_found(RecordKind::Medicine, id))
    }

    /// Writes a lot that was loaded and modified by a custody operation.
    pub fn save<C: StateContext + ?Sized>(
        ctx: &mut C,
        medicine: &Medicine,
    ) -> Result<(), CustodyError> {
        put_record(ctx, &medicine_key(&medicine.id), medicine)
    }

    /// Applies an update on behalf of the lot's current owner.
    pub fn update<C: StateContext + ?Sized>(
        ctx: &mut C,
        id: &str,
        update: MedicineUpdate,
        caller_id: &str,
    ) -> Result<(), CustodyError> {
        let mut medicine = Self::get(ctx, id)?;
        if caller_id != medicine.current_owner {
            return Err(CustodyError::Unauthorized {
                caller: caller_id.to_string(),
                required: medicine.current_owner,
            });
        }

        match update {
            MedicineUpdate::Location(location) => {
                require_text("location", &location)?;
                medicine.location = location;
            }
            MedicineUpdate::Status(status) => medicine.status = status,
            MedicineUpdate::AttachEvidence(hash) => {
                if medicine.evidence.contains(&hash) {
                    return Ok(());
                }
                medicine.evidence.push(hash);
            }
        }

        Self::save(ctx, &medicine)?;
        tracing::info!(medicine_id = %id, "updated medicine");
        Ok(())
    }

    pub fn detail<C: StateContext + ?Sized>(
        ctx: &mut C,
        id: &str,
    ) -> Result<MedicineDetail, CustodyError> {
        let medicine = Self::get(ctx, id)?;
        let transactions = TransactionLedger::list_for(ctx, &ContextKey::Medicine(id.to_string()))?;

        tracing::debug!(medicine_id = %id, entries = transactions.len(), "read medicine detail");
        Ok(MedicineDetail {
            medicine,
            transactions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Invocation, InvocationHeader, WorldMap};
    use crate::types::LogicalTimestamp;

    fn new_medicine(id: &str, quantity: u64) -> NewMedicine {
        NewMedicine {
            id: id.to_string(),
            name: "Amoxicillin 500mg".to_string(),
            manufacturer: "Mfg1".to_string(),
            location: "Plant A".to_string(),
            status: MedicineStatus::Registered,
            owner: "Mfg1".to_string(),
            quantity,
        }
    }

    fn header() -> InvocationHeader {
        InvocationHeader::new("Mfg1", "inv_registry", LogicalTimestamp::new(1))
    }

    #[test]
    fn register_then_get() {
        let world = WorldMap::new();
        let mut ctx = Invocation::new(header(), &world);

        EntityRegistry::register(&mut ctx, new_medicine("M1", 100)).unwrap();
        let medicine = EntityRegistry::get(&mut ctx, "M1").unwrap();

        assert_eq!(medicine.quantity, 100);
        assert_eq!(medicine.current_owner, "Mfg1");
        assert!(medicine.evidence.is_empty());
    }

    #[test]
    fn register_twice_is_rejected() {
        let world = WorldMap::new();
        let mut ctx = Invocation::new(header(), &world);

        EntityRegistry::register(&mut ctx, new_medicine("M1", 100)).unwrap();
        let err = EntityRegistry::register(&mut ctx, new_medicine("M1", 5)).unwrap_err();

        assert!(matches!(err, CustodyError::AlreadyExists { .. }));
    }

    #[test]
    fn register_requires_fields() {
        let world = WorldMap::new();
        let mut ctx = Invocation::new(header(), &world);

        let mut blank = new_medicine("M1", 1);
        blank.name = "  ".to_string();
        let err = EntityRegistry::register(&mut ctx, blank).unwrap_err();

        assert!(matches!(err, CustodyError::Validation { ref field, .. } if field == "name"));
    }

    #[test]
    fn only_location_and_status_are_updatable_by_name() {
        assert_eq!(
            MedicineUpdate::from_field("Location", "Warehouse 9").unwrap(),
            MedicineUpdate::Location("Warehouse 9".to_string())
        );
        assert_eq!(
            MedicineUpdate::from_field("Status", "InTransit").unwrap(),
            MedicineUpdate::Status(MedicineStatus::InTransit)
        );
        assert_eq!(
            MedicineUpdate::from_field("CurrentOwner", "Mallory").unwrap_err(),
            CustodyError::InvalidField("CurrentOwner".to_string())
        );
        assert!(MedicineUpdate::from_field("Status", "Lost").is_err());
    }

    #[test]
    fn attaching_evidence_twice_keeps_one_link() {
        let world = WorldMap::new();
        let mut ctx = Invocation::new(header(), &world);
        EntityRegistry::register(&mut ctx, new_medicine("M1", 10)).unwrap();
        let hash = ContentHash::of(b"gmp certificate");

        for _ in 0..2 {
            EntityRegistry::update(
                &mut ctx,
                "M1",
                MedicineUpdate::AttachEvidence(hash.clone()),
                "Mfg1",
            )
            .unwrap();
        }

        let medicine = EntityRegistry::get(&mut ctx, "M1").unwrap();
        assert_eq!(medicine.evidence, vec![hash]);
    }

    #[test]
    fn only_the_owner_updates_a_lot() {
        let world = WorldMap::new();
        let mut ctx = Invocation::new(header(), &world);
        EntityRegistry::register(&mut ctx, new_medicine("M1", 10)).unwrap();

        let err = EntityRegistry::update(
            &mut ctx,
            "M1",
            MedicineUpdate::Location("Back alley".into()),
            "Mallory",
        )
        .unwrap_err();

        assert!(matches!(err, CustodyError::Unauthorized { ref required, .. } if required == "Mfg1"));
        assert_eq!(EntityRegistry::get(&mut ctx, "M1").unwrap().location, "Plant A");
    }

    #[test]
    fn update_missing_medicine_is_not_found() {
        let world = WorldMap::new();
        let mut ctx = Invocation::new(header(), &world);

        let err =
            EntityRegistry::update(&mut ctx, "M404", MedicineUpdate::Location("x".into()), "Mfg1")
                .unwrap_err();
        assert_eq!(err, CustodyError::not_found(RecordKind::Medicine, "M404"));
    }
}
