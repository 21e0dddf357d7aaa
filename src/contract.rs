//! Named-operation dispatch. Arguments arrive as strings and are parsed into
//! an [`Operation`] before any state is touched.
use super::context::StateContext;
use super::error::CustodyError;
use super::ledger::{ContextKey, TransactionLedger};
use super::medicine::{EntityRegistry, MedicineStatus, MedicineUpdate, NewMedicine};
use super::order::{OrderLifecycle, OrderStatus};
use super::transfer::{Credential, CredentialVerifier, OwnershipTransferEngine};
use super::types::{ContentHash, parse_positive_quantity, parse_quantity};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    RegisterMedicine(NewMedicine),
    UpdateMedicine {
        id: String,
        update: MedicineUpdate,
    },
    AttachEvidence {
        id: String,
        hash: ContentHash,
    },
    GetMedicineDetail {
        id: String,
    },
    TransferMedicine {
        id: String,
        new_owner: String,
        quantity: u64,
    },
    PlaceOrder {
        medicine_id: String,
        seller_id: String,
        quantity: u64,
    },
    ConfirmOrder {
        order_id: String,
    },
    ReceiveMedicine {
        medicine_id: String,
        order_id: String,
    },
    SellMedicine {
        medicine_id: String,
        buyer_id: String,
        quantity: u64,
    },
    GetOrderDetail {
        order_id: String,
    },
    UpdateOrderStatus {
        order_id: String,
        status: OrderStatus,
    },
    AddTransaction {
        order_id: String,
        amount: u64,
        payment_method: String,
    },
    ChangeOwnership {
        order_id: String,
        new_hash: ContentHash,
        credential: Credential,
    },
    ListTransactions {
        order_id: String,
    },
}

fn arity<'a, const N: usize>(
    name: &str,
    args: &'a [String],
) -> Result<&'a [String; N], CustodyError> {
    args.try_into().map_err(|_| {
        CustodyError::validation(
            "arguments",
            format!("{name} expects {N} arguments, got {}", args.len()),
        )
    })
}

impl Operation {
    pub fn parse(name: &str, args: &[String]) -> Result<Self, CustodyError> {
        let operation = match name {
            "RegisterMedicine" => {
                let [id, medicine_name, manufacturer, location, status, owner, quantity] =
                    arity::<7>(name, args)?;
                Operation::RegisterMedicine(NewMedicine {
                    id: id.clone(),
                    name: medicine_name.clone(),
                    manufacturer: manufacturer.clone(),
                    location: location.clone(),
                    status: status.parse::<MedicineStatus>()?,
                    owner: owner.clone(),
                    quantity: parse_quantity("quantity", quantity)?,
                })
            }
            "UpdateMedicine" => {
                let [id, field, value] = arity::<3>(name, args)?;
                Operation::UpdateMedicine {
                    id: id.clone(),
                    update: MedicineUpdate::from_field(field, value)?,
                }
            }
            "AttachEvidence" => {
                let [id, hash] = arity::<2>(name, args)?;
                Operation::AttachEvidence {
                    id: id.clone(),
                    hash: ContentHash::parse(hash)?,
                }
            }
            "GetMedicineDetail" => {
                let [id] = arity::<1>(name, args)?;
                Operation::GetMedicineDetail { id: id.clone() }
            }
            "TransferMedicine" => {
                let [id, new_owner, quantity] = arity::<3>(name, args)?;
                Operation::TransferMedicine {
                    id: id.clone(),
                    new_owner: new_owner.clone(),
                    quantity: parse_quantity("quantity", quantity)?,
                }
            }
            "PlaceOrder" => {
                let [medicine_id, seller_id, quantity] = arity::<3>(name, args)?;
                Operation::PlaceOrder {
                    medicine_id: medicine_id.clone(),
                    seller_id: seller_id.clone(),
                    quantity: parse_quantity("quantity", quantity)?,
                }
            }
            "ConfirmOrder" => {
                let [order_id] = arity::<1>(name, args)?;
                Operation::ConfirmOrder {
                    order_id: order_id.clone(),
                }
            }
            "ReceiveMedicine" => {
                let [medicine_id, order_id] = arity::<2>(name, args)?;
                Operation::ReceiveMedicine {
                    medicine_id: medicine_id.clone(),
                    order_id: order_id.clone(),
                }
            }
            "SellMedicine" => {
                let [medicine_id, buyer_id, quantity] = arity::<3>(name, args)?;
                Operation::SellMedicine {
                    medicine_id: medicine_id.clone(),
                    buyer_id: buyer_id.clone(),
                    quantity: parse_quantity("quantity", quantity)?,
                }
            }
            "GetOrderDetail" => {
                let [order_id] = arity::<1>(name, args)?;
                Operation::GetOrderDetail {
                    order_id: order_id.clone(),
                }
            }
            "UpdateOrderStatus" => {
                let [order_id, status] = arity::<2>(name, args)?;
                Operation::UpdateOrderStatus {
                    order_id: order_id.clone(),
                    status: status.parse()?,
                }
            }
            "AddTransaction" => {
                let [order_id, amount, payment_method] = arity::<3>(name, args)?;
                Operation::AddTransaction {
                    order_id: order_id.clone(),
                    amount: parse_positive_quantity("amount", amount)?,
                    payment_method: payment_method.clone(),
                }
            }
            "ChangeOwnership" => {
                let [order_id, new_hash, credential] = arity::<3>(name, args)?;
                Operation::ChangeOwnership {
                    order_id: order_id.clone(),
                    new_hash: ContentHash::parse(new_hash)?,
                    credential: credential.parse()?,
                }
            }
            "ListTransactions" => {
                let [order_id] = arity::<1>(name, args)?;
                Operation::ListTransactions {
                    order_id: order_id.clone(),
                }
            }
            other => return Err(CustodyError::UnknownOperation(other.to_string())),
        };

        Ok(operation)
    }

    pub fn is_query(&self) -> bool {
        matches!(
            self,
            Operation::GetMedicineDetail { .. }
                | Operation::GetOrderDetail { .. }
                | Operation::ListTransactions { .. }
        )
    }
}

/// The custody contract. Every operation runs against the supplied context
/// and reads the caller from it.
pub struct CustodyContract<V> {
    verifier: V,
}

impl<V: CredentialVerifier> CustodyContract<V> {
    pub fn new(verifier: V) -> Self {
        Self { verifier }
    }

    pub fn verifier(&self) -> &V {
        &self.verifier
    }

    /// Parses and runs a named operation. Created ids come back as UTF-8,
    /// reads as CBOR records and other mutations as an empty payload.
    pub fn invoke<C: StateContext + ?Sized>(
        &self,
        ctx: &mut C,
        name: &str,
        args: &[String],
    ) -> Result<Vec<u8>, CustodyError> {
        let operation = Operation::parse(name, args)?;
        tracing::debug!(
            operation = %name,
            caller = %ctx.caller_identity(),
            invocation_id = %ctx.invocation_id(),
            "dispatching"
        );
        self.execute(ctx, operation)
    }

    pub fn execute<C: StateContext + ?Sized>(
        &self,
        ctx: &mut C,
        operation: Operation,
    ) -> Result<Vec<u8>, CustodyError> {
        let caller = ctx.caller_identity().to_string();

        let payload = match operation {
            Operation::RegisterMedicine(new) => EntityRegistry::register(ctx, new)?.into_bytes(),
            Operation::UpdateMedicine { id, update } => {
                EntityRegistry::update(ctx, &id, update, &caller)?;
                vec![]
            }
            Operation::AttachEvidence { id, hash } => {
                let update = MedicineUpdate::AttachEvidence(hash);
                EntityRegistry::update(ctx, &id, update, &caller)?;
                vec![]
            }
            Operation::GetMedicineDetail { id } => {
                minicbor::to_vec(EntityRegistry::detail(ctx, &id)?)?
            }
            Operation::TransferMedicine {
                id,
                new_owner,
                quantity,
            } => OwnershipTransferEngine::transfer(ctx, &id, &caller, &new_owner, quantity)?
                .into_bytes(),
            Operation::PlaceOrder {
                medicine_id,
                seller_id,
                quantity,
            } => OrderLifecycle::place_order(ctx, &medicine_id, &seller_id, &caller, quantity)?
                .into_bytes(),
            Operation::ConfirmOrder { order_id } => {
                OrderLifecycle::confirm_order(ctx, &order_id, &caller)?;
                vec![]
            }
            Operation::ReceiveMedicine {
                medicine_id,
                order_id,
            } => {
                OrderLifecycle::receive_medicine(ctx, &medicine_id, &order_id, &caller)?;
                vec![]
            }
            Operation::SellMedicine {
                medicine_id,
                buyer_id,
                quantity,
            } => OrderLifecycle::sell_medicine(ctx, &medicine_id, &buyer_id, quantity, &caller)?
                .into_bytes(),
            Operation::GetOrderDetail { order_id } => {
                minicbor::to_vec(OrderLifecycle::get_order(ctx, &order_id)?)?
            }
            Operation::UpdateOrderStatus { order_id, status } => {
                OrderLifecycle::update_order_status(ctx, &order_id, status, &caller)?;
                vec![]
            }
            Operation::AddTransaction {
                order_id,
                amount,
                payment_method,
            } => OrderLifecycle::add_payment(ctx, &order_id, amount, &payment_method)?.into_bytes(),
            Operation::ChangeOwnership {
                order_id,
                new_hash,
                credential,
            } => {
                OwnershipTransferEngine::change_ownership(
                    ctx,
                    &self.verifier,
                    &order_id,
                    &new_hash,
                    &credential,
                )?;
                vec![]
            }
            Operation::ListTransactions { order_id } => minicbor::to_vec(
                TransactionLedger::list_for(ctx, &ContextKey::Order(order_id))?,
            )?,
        };

        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn unknown_operations_are_named() {
        let err = Operation::parse("BurnMedicine", &args(&["M1"])).unwrap_err();
        assert_eq!(err, CustodyError::UnknownOperation("BurnMedicine".to_string()));
    }

    #[test]
    fn wrong_argument_count_is_a_validation_error() {
        let err = Operation::parse("ConfirmOrder", &args(&[])).unwrap_err();
        assert!(matches!(err, CustodyError::Validation { ref field, .. } if field == "arguments"));

        let err = Operation::parse("TransferMedicine", &args(&["M1", "Dist1"])).unwrap_err();
        assert!(matches!(err, CustodyError::Validation { .. }));
    }

    #[test]
    fn numbers_are_parsed_at_the_boundary() {
        let op = Operation::parse("TransferMedicine", &args(&["M1", "Dist1", "30"])).unwrap();
        assert_eq!(
            op,
            Operation::TransferMedicine {
                id: "M1".into(),
                new_owner: "Dist1".into(),
                quantity: 30,
            }
        );

        let err = Operation::parse("TransferMedicine", &args(&["M1", "Dist1", "-5"])).unwrap_err();
        assert!(matches!(err, CustodyError::Validation { ref field, .. } if field == "quantity"));
    }

    #[test]
    fn update_medicine_rejects_unknown_fields() {
        let err = Operation::parse("UpdateMedicine", &args(&["M1", "Quantity", "0"])).unwrap_err();
        assert_eq!(err, CustodyError::InvalidField("Quantity".to_string()));
    }

    #[test]
    fn queries_are_flagged() {
        assert!(Operation::parse("GetOrderDetail", &args(&["O1"])).unwrap().is_query());
        assert!(!Operation::parse("ConfirmOrder", &args(&["O1"])).unwrap().is_query());
    }
}
