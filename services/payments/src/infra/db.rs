use anyhow::Context as _;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
};

use shopflow_domain::id::{BillId, UserId};
use shopflow_domain::payment::{PaymentRequest, PaymentResult};
use shopflow_messaging::outbox::{NewOutboxMessage, enqueue};
use shopflow_messaging::topology::{PAYMENT_RESULT_KEY, PAYMENTS_EXCHANGE};
use shopflow_payments_schema::bills::{self, Column};

use crate::domain::repository::BillRepository;
use crate::domain::types::{Bill, BillStatus, charge};
use crate::error::PaymentsServiceError;

// ── Bill repository ──────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbBillRepository {
    pub db: DatabaseConnection,
}

impl BillRepository for DbBillRepository {
    async fn create(&self, bill: &Bill) -> Result<(), PaymentsServiceError> {
        bills::ActiveModel {
            id: Set(bill.id.0),
            user_id: Set(bill.user_id.0),
            balance: Set(bill.balance),
            currency: Set(bill.currency.clone()),
            status: Set(bill.status.as_str().to_owned()),
            created_at: Set(bill.created_at),
            updated_at: Set(bill.updated_at),
        }
        .insert(&self.db)
        .await
        .context("create bill")?;
        Ok(())
    }

    async fn find_for_user(
        &self,
        id: BillId,
        user_id: UserId,
    ) -> Result<Option<Bill>, PaymentsServiceError> {
        let model = bills::Entity::find_by_id(id.0)
            .filter(Column::UserId.eq(user_id.0))
            .one(&self.db)
            .await
            .context("find bill for user")?;
        Ok(model.map(bill_from_model).transpose()?)
    }

    async fn adjust_balance(
        &self,
        id: BillId,
        amount: i64,
        at: DateTime<Utc>,
    ) -> Result<Option<i64>, PaymentsServiceError> {
        let updated = bills::Entity::update_many()
            .col_expr(Column::Balance, Expr::col(Column::Balance).add(amount))
            .col_expr(Column::UpdatedAt, Expr::value(at))
            .filter(Column::Id.eq(id.0))
            .filter(Column::Status.eq(BillStatus::Active.as_str()))
            .filter(Column::Balance.gte(-amount))
            .exec(&self.db)
            .await
            .context("adjust bill balance")?;
        if updated.rows_affected == 0 {
            return Ok(None);
        }
        let model = bills::Entity::find_by_id(id.0)
            .one(&self.db)
            .await
            .context("reload bill")?
            .context("bill vanished after update")?;
        Ok(Some(model.balance))
    }

    async fn charge_and_enqueue(
        &self,
        request: &PaymentRequest,
    ) -> Result<PaymentResult, PaymentsServiceError> {
        let result = self
            .db
            .transaction::<_, PaymentResult, DbErr>(|txn| {
                let request = request.clone();
                Box::pin(async move {
                    let bill = bills::Entity::find()
                        .filter(Column::UserId.eq(request.user_id.0))
                        .filter(Column::Status.eq(BillStatus::Active.as_str()))
                        .order_by_asc(Column::CreatedAt)
                        .lock_exclusive()
                        .one(txn)
                        .await?
                        .map(bill_from_model)
                        .transpose()
                        .map_err(|e| DbErr::Custom(format!("{e:#}")))?;

                    let outcome = charge(&request, bill.as_ref());
                    if let Some(debit) = outcome.debit {
                        bills::ActiveModel {
                            id: Set(debit.bill_id.0),
                            balance: Set(debit.new_balance),
                            updated_at: Set(Utc::now()),
                            ..Default::default()
                        }
                        .update(txn)
                        .await?;
                    }

                    let message = NewOutboxMessage::json(
                        PAYMENTS_EXCHANGE,
                        PAYMENT_RESULT_KEY,
                        &outcome.result,
                    )
                    .map_err(|e| DbErr::Custom(e.to_string()))?
                    .with_header("order_id", request.order_id.to_string());
                    enqueue(txn, &message).await?;
                    Ok(outcome.result)
                })
            })
            .await
            .context("charge payment request")?;
        Ok(result)
    }
}

fn bill_from_model(model: bills::Model) -> anyhow::Result<Bill> {
    Ok(Bill {
        id: BillId(model.id),
        user_id: UserId(model.user_id),
        balance: model.balance,
        currency: model.currency,
        status: model
            .status
            .parse::<BillStatus>()
            .with_context(|| format!("bill {}", model.id))?,
        created_at: model.created_at,
        updated_at: model.updated_at,
    })
}
