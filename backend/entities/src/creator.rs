//! Entity Creator (spec.md §4.F): idempotent create-or-fetch for clients,
//! accounts, and goals, in that dependency order.

use std::collections::HashMap;

use model::{Account, AccountCategory, AccountType, Client, ClientStatus, FundCode, Goal,
    GoalStatus, GoalType, Percent, RiskTolerance};
use tracing::info;
use uuid::Uuid;

use crate::error::EntityError;

#[async_trait::async_trait]
pub trait EntityRepository: Send + Sync {
    async fn find_client_by_name(&self, name: &str) -> Result<Option<Client>, EntityError>;
    async fn insert_client(&self, client: &Client) -> Result<(), EntityError>;

    async fn find_account_by_number(&self, account_number: &str) -> Result<Option<Account>, EntityError>;
    async fn insert_account(&self, account: &Account) -> Result<(), EntityError>;

    async fn find_goal(&self, account_id: Uuid, goal_number: &str) -> Result<Option<Goal>, EntityError>;
    async fn insert_goal(&self, goal: &Goal) -> Result<(), EntityError>;
}

/// Default new-goal shape when none is supplied by the detector: `other`
/// type, `moderate` risk, per spec.md §4.F.
pub fn default_goal_type() -> GoalType {
    GoalType::Other
}

pub fn default_risk_tolerance() -> RiskTolerance {
    RiskTolerance::Moderate
}

/// Creates (or fetches, if a concurrent writer beat us to it) the client,
/// account, and goal for one new-goal key, returning the resolved `Goal`.
pub async fn ensure_client_account_goal(
    repo: &dyn EntityRepository,
    client_name: &str,
    account_number: &str,
    account_type: AccountType,
    account_category: AccountCategory,
    sponsor_code: Option<&str>,
    goal_number: &str,
    goal_title: &str,
    fund_distribution: HashMap<FundCode, Percent>,
) -> Result<Goal, EntityError> {
    let client = match repo.find_client_by_name(client_name).await? {
        Some(existing) => existing,
        None => {
            let client = Client {
                id: Uuid::new_v4(),
                name: client_name.to_string(),
                status: ClientStatus::Active,
            };
            repo.insert_client(&client).await?;
            info!(client_id = %client.id, client_name, "client created");
            client
        }
    };

    let account = match repo.find_account_by_number(account_number).await? {
        Some(existing) => existing,
        None => {
            let account = Account {
                id: Uuid::new_v4(),
                client_id: client.id,
                account_number: account_number.to_string(),
                account_type,
                category: account_category,
                sponsor_code: sponsor_code.map(|s| s.to_string()),
                status: model::AccountStatus::Active,
                opened_at: chrono::Utc::now(),
            };
            repo.insert_account(&account).await?;
            info!(account_id = %account.id, account_number, "account created");
            account
        }
    };

    match repo.find_goal(account.id, goal_number).await? {
        Some(existing) => Ok(existing),
        None => {
            let goal = Goal {
                id: Uuid::new_v4(),
                account_id: account.id,
                goal_number: goal_number.to_string(),
                title: goal_title.to_string(),
                goal_type: default_goal_type(),
                risk_tolerance: default_risk_tolerance(),
                fund_distribution,
                status: GoalStatus::Active,
            };
            repo.insert_goal(&goal).await?;
            info!(goal_id = %goal.id, goal_number, "goal created");
            Ok(goal)
        }
    }
}
