use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shopflow_domain::id::{BillId, UserId};

use crate::domain::types::Bill;
use crate::error::PaymentsServiceError;
use crate::state::AppState;
use crate::usecase::bill::{CreateBillUseCase, DepositInput, DepositUseCase, GetBalanceUseCase};

/// `?user_id=` on bill-scoped routes.
#[derive(Deserialize)]
pub struct OwnerQuery {
    pub user_id: Uuid,
}

// ── POST /bills/{user_id} ────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct BillResponse {
    pub id: String,
    pub user_id: String,
    pub balance: i64,
    pub currency: String,
    pub status: &'static str,
    #[serde(serialize_with = "shopflow_core::serde::to_rfc3339_ms")]
    pub created_at: DateTime<Utc>,
}

impl From<Bill> for BillResponse {
    fn from(bill: Bill) -> Self {
        Self {
            id: bill.id.to_string(),
            user_id: bill.user_id.to_string(),
            balance: bill.balance,
            currency: bill.currency,
            status: bill.status.as_str(),
            created_at: bill.created_at,
        }
    }
}

pub async fn create_bill(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<(StatusCode, Json<BillResponse>), PaymentsServiceError> {
    let usecase = CreateBillUseCase {
        repo: state.bill_repo(),
    };
    let bill = usecase.execute(UserId(user_id)).await?;
    Ok((StatusCode::CREATED, Json(bill.into())))
}

// ── POST /bills/{bill_id}/deposit ────────────────────────────────────────────

#[derive(Deserialize)]
pub struct DepositRequest {
    pub amount: i64,
}

#[derive(Serialize)]
pub struct BalanceResponse {
    pub bill_id: String,
    pub balance: i64,
}

pub async fn deposit(
    State(state): State<AppState>,
    Path(bill_id): Path<Uuid>,
    Query(owner): Query<OwnerQuery>,
    Json(body): Json<DepositRequest>,
) -> Result<Json<BalanceResponse>, PaymentsServiceError> {
    let usecase = DepositUseCase {
        repo: state.bill_repo(),
    };
    let balance = usecase
        .execute(DepositInput {
            bill_id: BillId(bill_id),
            user_id: UserId(owner.user_id),
            amount: body.amount,
        })
        .await?;
    Ok(Json(BalanceResponse {
        bill_id: bill_id.to_string(),
        balance,
    }))
}

// ── GET /bills/{bill_id}/balance ─────────────────────────────────────────────

pub async fn get_balance(
    State(state): State<AppState>,
    Path(bill_id): Path<Uuid>,
    Query(owner): Query<OwnerQuery>,
) -> Result<Json<BalanceResponse>, PaymentsServiceError> {
    let usecase = GetBalanceUseCase {
        repo: state.bill_repo(),
    };
    let bill = usecase
        .execute(BillId(bill_id), UserId(owner.user_id))
        .await?;
    Ok(Json(BalanceResponse {
        bill_id: bill.id.to_string(),
        balance: bill.balance,
    }))
}
