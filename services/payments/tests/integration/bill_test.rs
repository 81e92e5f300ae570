use shopflow_domain::id::BillId;
use shopflow_payments::domain::types::BillStatus;
use shopflow_payments::error::PaymentsServiceError;
use shopflow_payments::usecase::bill::{
    CreateBillUseCase, DepositInput, DepositUseCase, GetBalanceUseCase,
};
use uuid::Uuid;

use crate::helpers::{MockBillRepo, new_user, test_bill};

#[tokio::test]
async fn should_create_active_bill_with_zero_balance() {
    let repo = MockBillRepo::empty();
    let user = new_user();

    let bill = CreateBillUseCase { repo: repo.clone() }
        .execute(user)
        .await
        .unwrap();

    assert_eq!(bill.balance, 0);
    assert_eq!(bill.currency, "RUB");
    assert_eq!(bill.status, BillStatus::Active);
    assert_eq!(repo.bills.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn should_deposit_and_return_new_balance() {
    let user = new_user();
    let bill = test_bill(user, 100, BillStatus::Active);
    let repo = MockBillRepo::new(vec![bill.clone()]);

    let balance = DepositUseCase { repo: repo.clone() }
        .execute(DepositInput {
            bill_id: bill.id,
            user_id: user,
            amount: 250,
        })
        .await
        .unwrap();

    assert_eq!(balance, 350);
    assert_eq!(repo.balance_of(bill.id), Some(350));
}

#[tokio::test]
async fn should_hide_bills_of_other_users() {
    let bill = test_bill(new_user(), 100, BillStatus::Active);
    let uc = DepositUseCase {
        repo: MockBillRepo::new(vec![bill.clone()]),
    };

    let result = uc
        .execute(DepositInput {
            bill_id: bill.id,
            user_id: new_user(),
            amount: 10,
        })
        .await;

    assert!(
        matches!(result, Err(PaymentsServiceError::BillNotFound)),
        "expected BillNotFound, got {result:?}"
    );
}

#[tokio::test]
async fn should_reject_deposit_into_inactive_bill() {
    let user = new_user();
    for status in [BillStatus::Closed, BillStatus::Suspended] {
        let bill = test_bill(user, 100, status);
        let uc = DepositUseCase {
            repo: MockBillRepo::new(vec![bill.clone()]),
        };

        let result = uc
            .execute(DepositInput {
                bill_id: bill.id,
                user_id: user,
                amount: 10,
            })
            .await;

        assert!(matches!(result, Err(PaymentsServiceError::BillInactive)));
    }
}

#[tokio::test]
async fn should_reject_withdrawal_below_zero() {
    let user = new_user();
    let bill = test_bill(user, 100, BillStatus::Active);
    let repo = MockBillRepo::new(vec![bill.clone()]);

    let result = DepositUseCase { repo: repo.clone() }
        .execute(DepositInput {
            bill_id: bill.id,
            user_id: user,
            amount: -101,
        })
        .await;

    assert!(matches!(result, Err(PaymentsServiceError::InsufficientFunds)));
    assert_eq!(repo.balance_of(bill.id), Some(100));
}

#[tokio::test]
async fn should_reject_zero_amount() {
    let user = new_user();
    let bill = test_bill(user, 100, BillStatus::Active);
    let uc = DepositUseCase {
        repo: MockBillRepo::new(vec![bill.clone()]),
    };

    let result = uc
        .execute(DepositInput {
            bill_id: bill.id,
            user_id: user,
            amount: 0,
        })
        .await;

    assert!(matches!(result, Err(PaymentsServiceError::InvalidAmount)));
}

#[tokio::test]
async fn should_return_not_found_for_unknown_bill_balance() {
    let uc = GetBalanceUseCase {
        repo: MockBillRepo::empty(),
    };

    let result = uc.execute(BillId(Uuid::now_v7()), new_user()).await;

    assert!(matches!(result, Err(PaymentsServiceError::BillNotFound)));
}
