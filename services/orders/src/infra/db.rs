use anyhow::Context as _;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait, QueryFilter, QueryOrder, TransactionTrait,
};

use shopflow_domain::id::{OrderId, UserId};
use shopflow_messaging::outbox::{NewOutboxMessage, enqueue};
use shopflow_orders_schema::orders;

use crate::domain::repository::OrderRepository;
use crate::domain::types::{Order, OrderStatus};
use crate::error::OrdersServiceError;

// ── Order repository ─────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbOrderRepository {
    pub db: DatabaseConnection,
}

impl OrderRepository for DbOrderRepository {
    async fn create_and_enqueue(
        &self,
        order: &Order,
        message: &NewOutboxMessage,
    ) -> Result<(), OrdersServiceError> {
        self.db
            .transaction::<_, (), sea_orm::DbErr>(|txn| {
                let order = order.clone();
                let message = message.clone();
                Box::pin(async move {
                    insert_order(txn, &order).await?;
                    enqueue(txn, &message).await?;
                    Ok(())
                })
            })
            .await
            .context("create order with payment request")?;
        Ok(())
    }

    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>, OrdersServiceError> {
        let model = orders::Entity::find_by_id(id.0)
            .one(&self.db)
            .await
            .context("find order by id")?;
        Ok(model.map(order_from_model).transpose()?)
    }

    async fn list_by_user(&self, user_id: UserId) -> Result<Vec<Order>, OrdersServiceError> {
        let models = orders::Entity::find()
            .filter(orders::Column::UserId.eq(user_id.0))
            .order_by_desc(orders::Column::CreatedAt)
            .all(&self.db)
            .await
            .context("list orders by user")?;
        Ok(models
            .into_iter()
            .map(order_from_model)
            .collect::<anyhow::Result<_>>()?)
    }

    async fn transition(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, OrdersServiceError> {
        let result = orders::Entity::update_many()
            .col_expr(orders::Column::Status, Expr::value(to.as_str()))
            .col_expr(orders::Column::UpdatedAt, Expr::value(at))
            .filter(orders::Column::Id.eq(id.0))
            .filter(orders::Column::Status.eq(from.as_str()))
            .exec(&self.db)
            .await
            .context("transition order status")?;
        Ok(result.rows_affected == 1)
    }
}

async fn insert_order(txn: &DatabaseTransaction, order: &Order) -> Result<(), sea_orm::DbErr> {
    orders::ActiveModel {
        id: Set(order.id.0),
        user_id: Set(order.user_id.0),
        amount: Set(order.amount),
        description: Set(order.description.clone()),
        status: Set(order.status.as_str().to_owned()),
        created_at: Set(order.created_at),
        updated_at: Set(order.updated_at),
    }
    .insert(txn)
    .await?;
    Ok(())
}

fn order_from_model(model: orders::Model) -> anyhow::Result<Order> {
    Ok(Order {
        id: OrderId(model.id),
        user_id: UserId(model.user_id),
        amount: model.amount,
        description: model.description,
        status: model
            .status
            .parse::<OrderStatus>()
            .with_context(|| format!("order {}", model.id))?,
        created_at: model.created_at,
        updated_at: model.updated_at,
    })
}
