//! Property-based tests for argument parsing at the dispatch boundary
//!
//! Every string argument is parsed before state is touched, so these run
//! without any ledger at all.

use custody_ledger::{
    contract::Operation,
    error::CustodyError,
    order::OrderStatus,
    types::{ContentHash, parse_quantity},
};
use proptest::prelude::*;

/// Operation names with their argument counts
const ARITIES: [(&str, usize); 14] = [
    ("RegisterMedicine", 7),
    ("UpdateMedicine", 3),
    ("AttachEvidence", 2),
    ("GetMedicineDetail", 1),
    ("TransferMedicine", 3),
    ("PlaceOrder", 3),
    ("ConfirmOrder", 1),
    ("ReceiveMedicine", 2),
    ("SellMedicine", 3),
    ("GetOrderDetail", 1),
    ("UpdateOrderStatus", 2),
    ("AddTransaction", 3),
    ("ChangeOwnership", 3),
    ("ListTransactions", 1),
];

/// Strategy to pick an operation and an argument count other than its own
fn wrong_arity_strategy() -> impl Strategy<Value = (&'static str, usize)> {
    (0..ARITIES.len(), 0usize..10)
        .prop_filter("argument count must differ", |(i, n)| ARITIES[*i].1 != *n)
        .prop_map(|(i, n)| (ARITIES[i].0, n))
}

fn status_strategy() -> impl Strategy<Value = OrderStatus> {
    prop_oneof![
        Just(OrderStatus::Placed),
        Just(OrderStatus::Confirmed),
        Just(OrderStatus::Delivered),
        Just(OrderStatus::Cancelled),
    ]
}

proptest! {
    #[test]
    fn any_u64_parses_back(quantity in any::<u64>()) {
        prop_assert_eq!(parse_quantity("quantity", &quantity.to_string()), Ok(quantity));
    }

    #[test]
    fn negative_quantities_are_rejected(quantity in i64::MIN..0) {
        let err = parse_quantity("quantity", &quantity.to_string()).unwrap_err();
        let is_validation = matches!(err, CustodyError::Validation { .. });
        prop_assert!(is_validation);
    }

    #[test]
    fn non_numeric_quantities_are_rejected(raw in "[a-zA-Z ]{1,12}") {
        prop_assert!(parse_quantity("quantity", &raw).is_err());
    }

    #[test]
    fn wrong_argument_counts_never_parse((name, count) in wrong_arity_strategy()) {
        let args: Vec<String> = (0..count).map(|i| format!("arg{i}")).collect();
        let err = Operation::parse(name, &args).unwrap_err();
        let is_arity_error =
            matches!(err, CustodyError::Validation { ref field, .. } if field == "arguments");
        prop_assert!(is_arity_error);
    }

    #[test]
    fn unknown_names_are_reported(name in "[A-Z][a-z]{2,10}(Lot|Batch)") {
        prop_assert_eq!(
            Operation::parse(&name, &[]).unwrap_err(),
            CustodyError::UnknownOperation(name.clone())
        );
    }

    #[test]
    fn order_status_names_parse(status in status_strategy()) {
        let args = vec!["O1".to_string(), status.to_string()];
        prop_assert_eq!(
            Operation::parse("UpdateOrderStatus", &args).unwrap(),
            Operation::UpdateOrderStatus { order_id: "O1".to_string(), status }
        );
    }

    #[test]
    fn content_hashes_must_be_lowercase_sha256(content in prop::collection::vec(any::<u8>(), 0..64)) {
        let hash = ContentHash::of(&content);
        prop_assert_eq!(ContentHash::parse(hash.as_str()), Ok(hash.clone()));
        prop_assert!(ContentHash::parse(&hash.as_str().to_uppercase()).is_err());
        prop_assert!(ContentHash::parse(&hash.as_str()[..63]).is_err());
    }
}
