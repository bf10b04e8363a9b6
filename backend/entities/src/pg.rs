//! Postgres-backed [`EntityRepository`], raw `sqlx::query`/`query_as` (no
//! compile-time `query!` macro — there is no live database at build time).

use model::{Account, AccountCategory, AccountStatus, AccountType, Client, ClientStatus, Goal,
    GoalStatus, GoalType, RiskTolerance};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::creator::EntityRepository;
use crate::error::EntityError;

pub struct PgEntityRepository {
    pool: PgPool,
}

impl PgEntityRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl EntityRepository for PgEntityRepository {
    async fn find_client_by_name(&self, name: &str) -> Result<Option<Client>, EntityError> {
        let row = sqlx::query("SELECT id, name, status FROM clients WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| Client {
            id: r.get("id"),
            name: r.get("name"),
            status: parse_client_status(r.get("status")),
        }))
    }

    async fn insert_client(&self, client: &Client) -> Result<(), EntityError> {
        sqlx::query("INSERT INTO clients (id, name, status) VALUES ($1, $2, $3) ON CONFLICT (name) DO NOTHING")
            .bind(client.id)
            .bind(&client.name)
            .bind(client_status_str(client.status))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_account_by_number(&self, account_number: &str) -> Result<Option<Account>, EntityError> {
        let row = sqlx::query(
            "SELECT id, client_id, account_number, account_type, category, sponsor_code, status, opened_at \
             FROM accounts WHERE account_number = $1",
        )
        .bind(account_number)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| Account {
            id: r.get("id"),
            client_id: r.get("client_id"),
            account_number: r.get("account_number"),
            account_type: parse_account_type(r.get("account_type")),
            category: parse_account_category(r.get("category")),
            sponsor_code: r.get("sponsor_code"),
            status: parse_account_status(r.get("status")),
            opened_at: r.get("opened_at"),
        }))
    }

    async fn insert_account(&self, account: &Account) -> Result<(), EntityError> {
        sqlx::query(
            "INSERT INTO accounts (id, client_id, account_number, account_type, category, sponsor_code, status, opened_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) ON CONFLICT (account_number) DO NOTHING",
        )
        .bind(account.id)
        .bind(account.client_id)
        .bind(&account.account_number)
        .bind(account_type_str(account.account_type))
        .bind(account_category_str(account.category))
        .bind(&account.sponsor_code)
        .bind(account_status_str(account.status))
        .bind(account.opened_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_goal(&self, account_id: Uuid, goal_number: &str) -> Result<Option<Goal>, EntityError> {
        let row = sqlx::query(
            "SELECT id, account_id, goal_number, title, goal_type, risk_tolerance, fund_distribution, status \
             FROM goals WHERE account_id = $1 AND goal_number = $2",
        )
        .bind(account_id)
        .bind(goal_number)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| {
            let distribution_json: serde_json::Value = r.get("fund_distribution");
            Goal {
                id: r.get("id"),
                account_id: r.get("account_id"),
                goal_number: r.get("goal_number"),
                title: r.get("title"),
                goal_type: parse_goal_type(r.get("goal_type")),
                risk_tolerance: parse_risk_tolerance(r.get("risk_tolerance")),
                fund_distribution: serde_json::from_value(distribution_json).unwrap_or_default(),
                status: parse_goal_status(r.get("status")),
            }
        }))
    }

    async fn insert_goal(&self, goal: &Goal) -> Result<(), EntityError> {
        let distribution_json = serde_json::to_value(&goal.fund_distribution).unwrap_or_default();
        sqlx::query(
            "INSERT INTO goals (id, account_id, goal_number, title, goal_type, risk_tolerance, fund_distribution, status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) ON CONFLICT (account_id, goal_number) DO NOTHING",
        )
        .bind(goal.id)
        .bind(goal.account_id)
        .bind(&goal.goal_number)
        .bind(&goal.title)
        .bind(goal_type_str(goal.goal_type))
        .bind(risk_tolerance_str(goal.risk_tolerance))
        .bind(distribution_json)
        .bind(goal_status_str(goal.status))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn client_status_str(status: ClientStatus) -> &'static str {
    match status {
        ClientStatus::Active => "active",
        ClientStatus::Inactive => "inactive",
    }
}

fn parse_client_status(raw: String) -> ClientStatus {
    match raw.as_str() {
        "inactive" => ClientStatus::Inactive,
        _ => ClientStatus::Active,
    }
}

fn account_type_str(t: AccountType) -> &'static str {
    match t {
        AccountType::Personal => "personal",
        AccountType::Pooled => "pooled",
        AccountType::Joint => "joint",
        AccountType::Linked => "linked",
    }
}

fn parse_account_type(raw: String) -> AccountType {
    match raw.as_str() {
        "pooled" => AccountType::Pooled,
        "joint" => AccountType::Joint,
        "linked" => AccountType::Linked,
        _ => AccountType::Personal,
    }
}

fn account_category_str(c: AccountCategory) -> &'static str {
    match c {
        AccountCategory::General => "general",
        AccountCategory::Family => "family",
        AccountCategory::InvestmentClubs => "investment_clubs",
        AccountCategory::RetirementsBenefitScheme => "retirements_benefit_scheme",
    }
}

fn parse_account_category(raw: String) -> AccountCategory {
    match raw.as_str() {
        "family" => AccountCategory::Family,
        "investment_clubs" => AccountCategory::InvestmentClubs,
        "retirements_benefit_scheme" => AccountCategory::RetirementsBenefitScheme,
        _ => AccountCategory::General,
    }
}

fn account_status_str(s: AccountStatus) -> &'static str {
    match s {
        AccountStatus::Active => "active",
        AccountStatus::Inactive => "inactive",
    }
}

fn parse_account_status(raw: String) -> AccountStatus {
    match raw.as_str() {
        "inactive" => AccountStatus::Inactive,
        _ => AccountStatus::Active,
    }
}

fn goal_type_str(t: GoalType) -> &'static str {
    match t {
        GoalType::Other => "other",
        GoalType::Education => "education",
        GoalType::Retirement => "retirement",
        GoalType::Emergency => "emergency",
        GoalType::Wealth => "wealth",
    }
}

fn parse_goal_type(raw: String) -> GoalType {
    match raw.as_str() {
        "education" => GoalType::Education,
        "retirement" => GoalType::Retirement,
        "emergency" => GoalType::Emergency,
        "wealth" => GoalType::Wealth,
        _ => GoalType::Other,
    }
}

fn risk_tolerance_str(r: RiskTolerance) -> &'static str {
    match r {
        RiskTolerance::Conservative => "conservative",
        RiskTolerance::Moderate => "moderate",
        RiskTolerance::Aggressive => "aggressive",
    }
}

fn parse_risk_tolerance(raw: String) -> RiskTolerance {
    match raw.as_str() {
        "conservative" => RiskTolerance::Conservative,
        "aggressive" => RiskTolerance::Aggressive,
        _ => RiskTolerance::Moderate,
    }
}

fn goal_status_str(s: GoalStatus) -> &'static str {
    match s {
        GoalStatus::Active => "active",
        GoalStatus::Closed => "closed",
    }
}

fn parse_goal_status(raw: String) -> GoalStatus {
    match raw.as_str() {
        "closed" => GoalStatus::Closed,
        _ => GoalStatus::Active,
    }
}
