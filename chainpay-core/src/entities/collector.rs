use crate::entities::ChainName;
use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;
use uuid::Uuid;

/// A merchant-owned forwarding contract on an account-model chain.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct CollectorContract {
    pub id: i64,
    pub uuid: Uuid,
    pub merchant_id: i64,
    pub blockchain: ChainName,
    /// Numeric chain id; zero when unknown.
    pub chain_id: i64,
    pub contract_address: String,
    pub owner_address: String,
    pub factory_address: String,
    pub subscription_id: Option<String>,
    pub is_active: bool,
    pub created_at: time::PrimitiveDateTime,
}

impl CollectorContract {
    /// Network id to use for a notification routed to this contract.
    ///
    /// Delivery routes may carry a chain name instead of the numeric id, so
    /// the stored chain id wins when present.
    pub fn effective_network_id(&self, routed: &str) -> String {
        if self.chain_id != 0 {
            self.chain_id.to_string()
        } else {
            routed.to_owned()
        }
    }
}

#[derive(Debug, Clone)]
pub struct GetCollectorByUuid {
    pub uuid: Uuid,
}

impl Processor<GetCollectorByUuid> for DatabaseProcessor {
    type Output = Option<CollectorContract>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetCollectorByUuid")]
    async fn process(&self, query: GetCollectorByUuid) -> Result<Option<CollectorContract>, sqlx::Error> {
        sqlx::query_as::<_, CollectorContract>(
            "SELECT * FROM collector_contracts WHERE uuid = $1 AND is_active",
        )
        .bind(query.uuid)
        .fetch_optional(&self.pool)
        .await
    }
}
