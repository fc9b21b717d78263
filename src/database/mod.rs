//! MySQL-backed entity store.
//!
//! Blocking `mysql` calls run on the blocking pool through [`MysqlStore::run`].
//! Timestamps are stored as fixed-width strings (see
//! [`crate::libs::time::YYYYMMDD_HHMMSS`]) so range filters compare as text.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mysql::{
    params,
    prelude::{FromValue, Queryable},
    FromRowError, FromValueError, Pool, PooledConn, TxOpts, Value,
};

use crate::{
    error::{CrmError, CrmResult},
    libs::{
        gen_id,
        time::{format_time, Period, Timestamp},
    },
    model::{
        CreateProgress, CreateUser, Customer, CustomerPatch, CustomerStatus, Department,
        NewCustomer, NewDepartment, Progress, Session, Target, TargetOwner, User, UserPatch,
    },
    perm::{Role, Scope},
    store::{
        CustomerOps, CustomerQuery, DepartmentOps, Page, ProgressOps, SessionOps, StatusGroup,
        TargetOps, UserOps,
    },
};

pub struct Database;
impl Database {
    /// 主键已存在
    pub const DUPLICATE_KEY_ERROR_CODE: u16 = 1062;
}

/// A text column read through `FromStr`.
pub struct Parsed<T>(T, Value);

impl<T: FromStr> TryFrom<Value> for Parsed<T> {
    type Error = FromValueError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let parsed = match &value {
            Value::Bytes(bytes) => std::str::from_utf8(bytes).ok().and_then(|s| s.parse().ok()),
            _ => None,
        };
        match parsed {
            Some(parsed) => Ok(Parsed(parsed, value)),
            None => Err(FromValueError(value)),
        }
    }
}

impl<T> From<Parsed<T>> for Value {
    fn from(parsed: Parsed<T>) -> Self {
        parsed.1
    }
}

macro_rules! text_column {
    ($($ty:ty),+) => {$(
        impl FromValue for $ty {
            type Intermediate = Parsed<$ty>;
        }
        impl From<Parsed<$ty>> for $ty {
            fn from(parsed: Parsed<$ty>) -> Self {
                parsed.0
            }
        }
    )+};
}

text_column!(Role, CustomerStatus, Timestamp);

impl From<Timestamp> for Value {
    fn from(time: Timestamp) -> Self {
        Value::from(format_time(&time))
    }
}

const USER_COLUMNS: &str =
    "id, email, username, name, password, role, department_id, manager_id, deleted_at, created_at, updated_at";

const CUSTOMER_SELECT: &str = "SELECT c.id, c.am_id, u.name AS am_name, \
    u.department_id AS am_department_id, c.company_name, c.pic, c.phone, c.email, c.potential, \
    c.timeline, c.status, c.deleted_at, c.created_at, c.updated_at \
    FROM customer c LEFT JOIN user u ON u.id = c.am_id";

const PROGRESS_SELECT: &str = "SELECT p.id, p.customer_id, c.company_name AS customer_name, \
    p.am_id, u.name AS am_name, p.date, p.description, p.status, p.created_at \
    FROM progress p JOIN customer c ON c.id = p.customer_id LEFT JOIN user u ON u.id = p.am_id \
    WHERE c.deleted_at IS NULL";

const TARGET_COLUMNS: &str =
    "id, amount, currency, month, year, department_id, user_id, created_at, updated_at";

fn opt_time_value(time: &Option<Timestamp>) -> Value {
    time.map(Value::from).unwrap_or(Value::NULL)
}

/// Fails on the first row that does not decode.
fn typed<T>(rows: Vec<Result<T, FromRowError>>) -> CrmResult<Vec<T>> {
    Ok(rows.into_iter().collect::<Result<_, _>>()?)
}

/// Replaces the driver's duplicate-entry text, which names internal keys.
fn conflict_as(message: &'static str) -> impl Fn(CrmError) -> CrmError {
    move |e| match e {
        CrmError::Conflict(_) => CrmError::conflict(message),
        e => e,
    }
}

/// SQL and positional values for a [`CustomerQuery`]. Must agree with
/// [`CustomerQuery::matches`].
fn customer_where(query: &CustomerQuery) -> (String, Vec<Value>) {
    let mut sql = String::from(" WHERE c.deleted_at IS NULL");
    let mut values: Vec<Value> = Vec::new();
    match &query.scope {
        Scope::All => {}
        Scope::Department(department) => {
            sql.push_str(" AND u.department_id = ?");
            values.push(department.clone().into());
        }
        Scope::Owner(owner) => {
            sql.push_str(" AND c.am_id = ?");
            values.push(owner.clone().into());
        }
        Scope::Nothing => sql.push_str(" AND 1 = 0"),
    }
    if let Some(status) = query.status {
        sql.push_str(" AND c.status = ?");
        values.push(status.as_str().to_owned().into());
    }
    if let Some((start, end)) = &query.updated_in {
        sql.push_str(" AND c.updated_at >= ? AND c.updated_at < ?");
        values.push(format_time(start).into());
        values.push(format_time(end).into());
    }
    (sql, values)
}

fn fetch_user<Q: Queryable>(conn: &mut Q, id: &String, lock: bool) -> CrmResult<Option<User>> {
    let stmt = format!(
        "SELECT {USER_COLUMNS} FROM user WHERE id = ? AND deleted_at IS NULL{}",
        op::ternary!(lock => " FOR UPDATE"; "")
    );
    Ok(conn.exec_first_opt::<User, _, _>(stmt, (id,))?.transpose()?)
}

fn fetch_customer<Q: Queryable>(
    conn: &mut Q,
    id: &String,
    lock: bool,
) -> CrmResult<Option<Customer>> {
    let stmt = format!(
        "{CUSTOMER_SELECT} WHERE c.id = ? AND c.deleted_at IS NULL{}",
        op::ternary!(lock => " FOR UPDATE"; "")
    );
    Ok(conn.exec_first_opt::<Customer, _, _>(stmt, (id,))?.transpose()?)
}

fn fetch_target<Q: Queryable>(
    conn: &mut Q,
    owner: &TargetOwner,
    period: Period,
) -> CrmResult<Option<Target>> {
    let (column, id) = match owner {
        TargetOwner::User(id) => ("user_id", id),
        TargetOwner::Department(id) => ("department_id", id),
    };
    let stmt =
        format!("SELECT {TARGET_COLUMNS} FROM target WHERE {column} = ? AND month = ? AND year = ?");
    Ok(conn
        .exec_first_opt::<Target, _, _>(stmt, (id, period.month, period.year))?
        .transpose()?)
}

/// Production store over a `mysql::Pool`.
#[derive(Clone)]
pub struct MysqlStore {
    pool: Pool,
}

impl MysqlStore {
    /// 连接数据库
    pub fn connect(url: &str) -> CrmResult<Self> {
        Ok(Self {
            pool: Pool::new(url)?,
        })
    }

    pub async fn create_tables(&self) -> CrmResult<()> {
        self.run(|conn| {
            let sql = include_str!("./table.sql");
            for stmt in sql.split(';').map(str::trim).filter(|s| !s.is_empty()) {
                conn.query_drop(stmt)?;
            }
            Ok(())
        })
        .await
    }

    async fn run<T, F>(&self, f: F) -> CrmResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut PooledConn) -> CrmResult<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get_conn()?;
            f(&mut conn)
        })
        .await?
    }
}

#[async_trait]
impl UserOps for MysqlStore {
    async fn create_user(&self, user: CreateUser) -> CrmResult<User> {
        self.run(move |conn| {
            let id = gen_id();
            let now = format_time(&Utc::now());
            conn.exec_drop(
                "INSERT INTO user (id, email, username, email_key, username_key, name, password, \
                 role, department_id, manager_id, created_at, updated_at) VALUES (:id, :email, \
                 :username, :email_key, :username_key, :name, :password, :role, :department_id, \
                 :manager_id, :now, :now)",
                params! {
                    "id" => &id,
                    "email" => &user.email,
                    "username" => &user.username,
                    "email_key" => user.email.to_lowercase(),
                    "username_key" => user.username.as_ref().map(|u| u.to_lowercase()),
                    "name" => &user.name,
                    "password" => &user.password_hash,
                    "role" => user.role.to_string(),
                    "department_id" => &user.department_id,
                    "manager_id" => &user.manager_id,
                    "now" => &now,
                },
            )
            .map_err(CrmError::from)
            .map_err(conflict_as("Email or username already in use"))?;
            fetch_user(conn, &id, false)?
                .ok_or_else(|| CrmError::internal("inserted user not readable"))
        })
        .await
    }

    async fn get_user(&self, id: &str) -> CrmResult<Option<User>> {
        let id = id.to_owned();
        self.run(move |conn| fetch_user(conn, &id, false)).await
    }

    async fn find_user_by_login(&self, login: &str) -> CrmResult<Option<User>> {
        let key = login.trim().to_lowercase();
        self.run(move |conn| {
            for column in ["email_key", "username_key"] {
                let stmt = format!(
                    "SELECT {USER_COLUMNS} FROM user WHERE {column} = ? AND deleted_at IS NULL"
                );
                if let Some(user) = conn.exec_first_opt::<User, _, _>(stmt, (&key,))? {
                    return Ok(Some(user?));
                }
            }
            Ok(None)
        })
        .await
    }

    async fn list_users(&self, role: Option<Role>) -> CrmResult<Vec<User>> {
        self.run(move |conn| {
            let rows = match role {
                Some(role) => conn.exec_opt::<User, _, _>(
                    format!(
                        "SELECT {USER_COLUMNS} FROM user WHERE deleted_at IS NULL AND role = ? \
                         ORDER BY name, id"
                    ),
                    (role.to_string(),),
                )?,
                None => conn.query_opt::<User, _>(format!(
                    "SELECT {USER_COLUMNS} FROM user WHERE deleted_at IS NULL ORDER BY name, id"
                ))?,
            };
            typed(rows)
        })
        .await
    }

    async fn update_user(&self, id: &str, patch: &UserPatch) -> CrmResult<Option<User>> {
        let id = id.to_owned();
        let patch = patch.clone();
        self.run(move |conn| {
            let mut tx = conn.start_transaction(TxOpts::default())?;
            let Some(mut user) = fetch_user(&mut tx, &id, true)? else {
                return Ok(None);
            };
            patch.apply(&mut user, Utc::now());
            tx.exec_drop(
                "UPDATE user SET email = :email, email_key = :email_key, username = :username, \
                 username_key = :username_key, name = :name, role = :role, \
                 department_id = :department_id, manager_id = :manager_id, \
                 updated_at = :updated_at WHERE id = :id",
                params! {
                    "email" => &user.email,
                    "email_key" => user.email.to_lowercase(),
                    "username" => &user.username,
                    "username_key" => user.username.as_ref().map(|u| u.to_lowercase()),
                    "name" => &user.name,
                    "role" => user.role.to_string(),
                    "department_id" => &user.department_id,
                    "manager_id" => &user.manager_id,
                    "updated_at" => format_time(&user.updated_at),
                    "id" => &user.id,
                },
            )
            .map_err(CrmError::from)
            .map_err(conflict_as("Email or username already in use"))?;
            tx.commit()?;
            Ok(Some(user))
        })
        .await
    }

    async fn soft_delete_user(&self, id: &str) -> CrmResult<bool> {
        let id = id.to_owned();
        self.run(move |conn| {
            let now = format_time(&Utc::now());
            conn.exec_drop(
                "UPDATE user SET deleted_at = ?, updated_at = ?, email_key = NULL, \
                 username_key = NULL WHERE id = ? AND deleted_at IS NULL",
                (&now, &now, &id),
            )?;
            Ok(conn.affected_rows() > 0)
        })
        .await
    }

    async fn set_password(&self, id: &str, password_hash: &str) -> CrmResult<bool> {
        let id = id.to_owned();
        let hash = password_hash.to_owned();
        self.run(move |conn| {
            conn.exec_drop(
                "UPDATE user SET password = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
                (&hash, format_time(&Utc::now()), &id),
            )?;
            Ok(conn.affected_rows() > 0)
        })
        .await
    }
}

#[async_trait]
impl DepartmentOps for MysqlStore {
    async fn create_department(&self, department: &NewDepartment) -> CrmResult<Department> {
        let department = Department {
            id: gen_id(),
            name: department.name.clone(),
            gm_id: department.gm_id.clone(),
        };
        self.run(move |conn| {
            conn.exec_drop(
                "INSERT INTO department (id, name, gm_id) VALUES (?, ?, ?)",
                (&department.id, &department.name, &department.gm_id),
            )
            .map_err(CrmError::from)
            .map_err(conflict_as("Department name already exists"))?;
            Ok(department)
        })
        .await
    }

    async fn get_department(&self, id: &str) -> CrmResult<Option<Department>> {
        let id = id.to_owned();
        self.run(move |conn| {
            Ok(conn
                .exec_first_opt::<Department, _, _>(
                    "SELECT id, name, gm_id FROM department WHERE id = ?",
                    (&id,),
                )?
                .transpose()?)
        })
        .await
    }

    async fn list_departments(&self) -> CrmResult<Vec<Department>> {
        self.run(|conn| {
            typed(conn.query_opt::<Department, _>("SELECT id, name, gm_id FROM department ORDER BY name")?)
        })
        .await
    }
}

#[async_trait]
impl CustomerOps for MysqlStore {
    async fn create_customer(
        &self,
        am_id: &str,
        input: &NewCustomer,
        now: DateTime<Utc>,
    ) -> CrmResult<Customer> {
        let am_id = am_id.to_owned();
        let input = input.clone();
        self.run(move |conn| {
            let id = gen_id();
            let now = format_time(&now);
            conn.exec_drop(
                "INSERT INTO customer (id, am_id, company_name, pic, phone, email, potential, \
                 timeline, status, created_at, updated_at) VALUES (:id, :am_id, :company_name, \
                 :pic, :phone, :email, :potential, :timeline, :status, :now, :now)",
                params! {
                    "id" => &id,
                    "am_id" => &am_id,
                    "company_name" => &input.company_name,
                    "pic" => &input.pic,
                    "phone" => &input.phone,
                    "email" => &input.email,
                    "potential" => input.potential,
                    "timeline" => opt_time_value(&input.timeline.map(Timestamp)),
                    "status" => input.status.to_string(),
                    "now" => &now,
                },
            )?;
            fetch_customer(conn, &id, false)?
                .ok_or_else(|| CrmError::internal("inserted customer not readable"))
        })
        .await
    }

    async fn get_customer(&self, id: &str) -> CrmResult<Option<Customer>> {
        let id = id.to_owned();
        self.run(move |conn| fetch_customer(conn, &id, false)).await
    }

    async fn update_customer(
        &self,
        id: &str,
        patch: &CustomerPatch,
        now: DateTime<Utc>,
    ) -> CrmResult<Option<Customer>> {
        let id = id.to_owned();
        let patch = patch.clone();
        self.run(move |conn| {
            let mut tx = conn.start_transaction(TxOpts::default())?;
            let Some(mut customer) = fetch_customer(&mut tx, &id, true)? else {
                return Ok(None);
            };
            patch.apply(&mut customer, now);
            tx.exec_drop(
                "UPDATE customer SET company_name = :company_name, pic = :pic, phone = :phone, \
                 email = :email, potential = :potential, timeline = :timeline, status = :status, \
                 updated_at = :updated_at WHERE id = :id",
                params! {
                    "company_name" => &customer.company_name,
                    "pic" => &customer.pic,
                    "phone" => &customer.phone,
                    "email" => &customer.email,
                    "potential" => customer.potential,
                    "timeline" => opt_time_value(&customer.timeline),
                    "status" => customer.status.to_string(),
                    "updated_at" => format_time(&customer.updated_at),
                    "id" => &customer.id,
                },
            )?;
            tx.commit()?;
            Ok(Some(customer))
        })
        .await
    }

    async fn soft_delete_customer(&self, id: &str, now: DateTime<Utc>) -> CrmResult<bool> {
        let id = id.to_owned();
        self.run(move |conn| {
            let now = format_time(&now);
            conn.exec_drop(
                "UPDATE customer SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
                (&now, &now, &id),
            )?;
            Ok(conn.affected_rows() > 0)
        })
        .await
    }

    async fn list_customers(
        &self,
        query: &CustomerQuery,
        page: Option<Page>,
    ) -> CrmResult<Vec<Customer>> {
        let (filter, mut values) = customer_where(query);
        let mut stmt = format!("{CUSTOMER_SELECT}{filter} ORDER BY c.created_at DESC, c.id DESC");
        if let Some(page) = page {
            stmt.push_str(" LIMIT ? OFFSET ?");
            values.push(Value::from(page.limit as u64));
            values.push(Value::from(page.offset() as u64));
        }
        self.run(move |conn| typed(conn.exec_opt::<Customer, _, _>(stmt, values)?))
            .await
    }

    async fn count_customers(&self, query: &CustomerQuery) -> CrmResult<u64> {
        let (filter, values) = customer_where(query);
        let stmt = format!("SELECT COUNT(*) FROM customer c LEFT JOIN user u ON u.id = c.am_id{filter}");
        self.run(move |conn| Ok(conn.exec_first::<u64, _, _>(stmt, values)?.unwrap_or(0)))
            .await
    }

    async fn group_customers_by_status(
        &self,
        query: &CustomerQuery,
    ) -> CrmResult<Vec<StatusGroup>> {
        let (filter, values) = customer_where(query);
        let stmt = format!(
            "SELECT c.status, COUNT(*), COALESCE(SUM(c.potential), 0) \
             FROM customer c LEFT JOIN user u ON u.id = c.am_id{filter} GROUP BY c.status"
        );
        self.run(move |conn| {
            let mut groups: Vec<StatusGroup> =
                typed(conn.exec_opt::<(CustomerStatus, u64, f64), _, _>(stmt, values)?)?
                    .into_iter()
                    .map(|(status, count, value)| StatusGroup {
                        status,
                        count,
                        value,
                    })
                    .collect();
            groups.sort_by_key(|g| g.status);
            Ok(groups)
        })
        .await
    }

    async fn customers_needing_follow_up(
        &self,
        am_id: &str,
        cutoff: DateTime<Utc>,
    ) -> CrmResult<Vec<Customer>> {
        let am_id = am_id.to_owned();
        let open = CustomerStatus::OPEN
            .iter()
            .map(|s| format!("'{}'", s.as_str()))
            .collect::<Vec<_>>()
            .join(", ");
        let stmt = format!(
            "{CUSTOMER_SELECT} WHERE c.deleted_at IS NULL AND c.am_id = ? AND c.status IN ({open}) \
             AND NOT EXISTS (SELECT 1 FROM progress p WHERE p.customer_id = c.id AND p.date >= ?) \
             ORDER BY c.updated_at, c.id"
        );
        self.run(move |conn| {
            typed(conn.exec_opt::<Customer, _, _>(stmt, (&am_id, format_time(&cutoff)))?)
        })
        .await
    }
}

#[async_trait]
impl ProgressOps for MysqlStore {
    async fn create_progress(&self, progress: &CreateProgress) -> CrmResult<Progress> {
        let progress = progress.clone();
        self.run(move |conn| {
            let id = gen_id();
            conn.exec_drop(
                "INSERT INTO progress (id, customer_id, am_id, date, description, status, created_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
                (
                    &id,
                    &progress.customer_id,
                    &progress.am_id,
                    format_time(&progress.date),
                    &progress.description,
                    progress.status.to_string(),
                    format_time(&Utc::now()),
                ),
            )?;
            conn.exec_first_opt::<Progress, _, _>(format!("{PROGRESS_SELECT} AND p.id = ?"), (&id,))?
                .transpose()?
                .ok_or_else(|| CrmError::not_found("Customer not found"))
        })
        .await
    }

    async fn list_progress_by_customer(
        &self,
        customer_id: &str,
        limit: Option<usize>,
    ) -> CrmResult<Vec<Progress>> {
        let customer_id = customer_id.to_owned();
        let mut stmt =
            format!("{PROGRESS_SELECT} AND p.customer_id = ? ORDER BY p.date DESC, p.created_at DESC");
        let mut values = vec![Value::from(customer_id)];
        if let Some(limit) = limit {
            stmt.push_str(" LIMIT ?");
            values.push(Value::from(limit as u64));
        }
        self.run(move |conn| typed(conn.exec_opt::<Progress, _, _>(stmt, values)?))
            .await
    }

    async fn list_progress_by_am(&self, am_id: &str, limit: usize) -> CrmResult<Vec<Progress>> {
        let am_id = am_id.to_owned();
        let stmt = format!(
            "{PROGRESS_SELECT} AND p.am_id = ? ORDER BY p.date DESC, p.created_at DESC LIMIT ?"
        );
        self.run(move |conn| {
            typed(conn.exec_opt::<Progress, _, _>(stmt, (&am_id, limit as u64))?)
        })
        .await
    }
}

#[async_trait]
impl TargetOps for MysqlStore {
    async fn find_target(&self, owner: &TargetOwner, period: Period) -> CrmResult<Option<Target>> {
        let owner = owner.clone();
        self.run(move |conn| fetch_target(conn, &owner, period)).await
    }

    async fn list_targets(&self, scope: &Scope, period: Period) -> CrmResult<Vec<Target>> {
        let mut stmt = format!("SELECT {TARGET_COLUMNS} FROM target WHERE month = ? AND year = ?");
        let mut values = vec![Value::from(period.month), Value::from(period.year)];
        match scope {
            Scope::All => {}
            Scope::Owner(user) => {
                stmt.push_str(" AND user_id = ?");
                values.push(user.clone().into());
            }
            Scope::Department(department) => {
                stmt.push_str(
                    " AND (department_id = ? OR user_id IN \
                     (SELECT id FROM user WHERE department_id = ?))",
                );
                values.push(department.clone().into());
                values.push(department.clone().into());
            }
            Scope::Nothing => return Ok(Vec::new()),
        }
        stmt.push_str(" ORDER BY created_at, id");
        self.run(move |conn| typed(conn.exec_opt::<Target, _, _>(stmt, values)?))
            .await
    }

    async fn upsert_target(
        &self,
        owner: &TargetOwner,
        amount: f64,
        currency: &str,
        period: Period,
    ) -> CrmResult<(Target, bool)> {
        let owner = owner.clone();
        let currency = currency.to_owned();
        self.run(move |conn| {
            let mut tx = conn.start_transaction(TxOpts::default())?;
            let now = format_time(&Utc::now());
            // The unique keys on (owner, month, year) make this a single
            // atomic insert-or-overwrite. One affected row means an insert.
            tx.exec_drop(
                "INSERT INTO target (id, amount, currency, month, year, department_id, user_id, \
                 created_at, updated_at) VALUES (:id, :amount, :currency, :month, :year, \
                 :department_id, :user_id, :now, :now) \
                 ON DUPLICATE KEY UPDATE amount = VALUES(amount), updated_at = VALUES(updated_at)",
                params! {
                    "id" => gen_id(),
                    "amount" => amount,
                    "currency" => &currency,
                    "month" => period.month,
                    "year" => period.year,
                    "department_id" => owner.department_id().map(str::to_owned),
                    "user_id" => owner.user_id().map(str::to_owned),
                    "now" => &now,
                },
            )?;
            let created = tx.affected_rows() == 1;
            let target = fetch_target(&mut tx, &owner, period)?
                .ok_or_else(|| CrmError::internal("upserted target not readable"))?;
            tx.commit()?;
            Ok((target, created))
        })
        .await
    }
}

#[async_trait]
impl SessionOps for MysqlStore {
    async fn create_session(
        &self,
        user_id: &str,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> CrmResult<Session> {
        let session = Session {
            id: gen_id(),
            user_id: user_id.to_owned(),
            token: token.to_owned(),
            expires_at: expires_at.into(),
            created_at: Timestamp::now(),
        };
        self.run(move |conn| {
            conn.exec_drop(
                "INSERT INTO session (id, user_id, token, expires_at, created_at) VALUES (?, ?, ?, ?, ?)",
                (
                    &session.id,
                    &session.user_id,
                    &session.token,
                    format_time(&session.expires_at),
                    format_time(&session.created_at),
                ),
            )
            .map_err(CrmError::from)
            .map_err(conflict_as("Session token already issued"))?;
            Ok(session)
        })
        .await
    }

    async fn find_session(&self, token: &str) -> CrmResult<Option<Session>> {
        let token = token.to_owned();
        self.run(move |conn| {
            Ok(conn
                .exec_first_opt::<Session, _, _>(
                    "SELECT id, user_id, token, expires_at, created_at FROM session WHERE token = ?",
                    (&token,),
                )?
                .transpose()?)
        })
        .await
    }

    async fn delete_session(&self, token: &str) -> CrmResult<bool> {
        let token = token.to_owned();
        self.run(move |conn| {
            conn.exec_drop("DELETE FROM session WHERE token = ?", (&token,))?;
            Ok(conn.affected_rows() > 0)
        })
        .await
    }

    async fn delete_user_sessions(&self, user_id: &str) -> CrmResult<u64> {
        let user_id = user_id.to_owned();
        self.run(move |conn| {
            conn.exec_drop("DELETE FROM session WHERE user_id = ?", (&user_id,))?;
            Ok(conn.affected_rows())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn customer_filter_follows_scope() {
        let (sql, values) = customer_where(&CustomerQuery::scoped(Scope::Department("d1".into())));
        assert!(sql.ends_with("AND u.department_id = ?"));
        assert_eq!(values.len(), 1);

        let (sql, values) = customer_where(&CustomerQuery::scoped(Scope::Nothing));
        assert!(sql.contains("1 = 0"));
        assert!(values.is_empty());
    }

    #[test]
    fn period_window_uses_storage_format() {
        let period = Period::new(2, 2025).unwrap();
        let query = CustomerQuery::scoped(Scope::Owner("am1".into()))
            .with_status(Some(CustomerStatus::ClosedWon))
            .updated_within(period);
        let (sql, values) = customer_where(&query);
        assert!(sql.contains("c.am_id = ?"));
        assert!(sql.contains("c.status = ?"));
        assert_eq!(values.len(), 4);
        assert_eq!(values[2], Value::from("2025-02-01 00:00:00.000".to_owned()));
        assert_eq!(values[3], Value::from("2025-03-01 00:00:00.000".to_owned()));
    }

    #[test]
    fn text_columns_decode_into_domain_types() {
        let text = |s: &str| Value::Bytes(s.as_bytes().to_vec());
        assert_eq!(Role::from_value_opt(text("GM")).unwrap(), Role::Gm);
        assert_eq!(
            CustomerStatus::from_value_opt(text("closed-won")).unwrap(),
            CustomerStatus::ClosedWon
        );
        let stamp = Timestamp::from_value_opt(text("2025-02-01 08:30:00.250")).unwrap();
        assert_eq!(stamp.to_string(), "2025-02-01 08:30:00.250");
        assert_eq!(Option::<Timestamp>::from_value_opt(Value::NULL).unwrap(), None);

        assert!(CustomerStatus::from_value_opt(text("won")).is_err());
        assert!(Role::from_value_opt(Value::Int(1)).is_err());
        assert!(Timestamp::from_value_opt(text("yesterday")).is_err());
    }

    #[test]
    fn timestamps_bind_in_storage_format() {
        let stamp: Timestamp = "2025-03-09 08:07:06.000".parse().unwrap();
        assert_eq!(Value::from(stamp), Value::from("2025-03-09 08:07:06.000".to_owned()));
        assert_eq!(opt_time_value(&None), Value::NULL);
    }

    #[test]
    fn conflicts_get_a_public_message() {
        let err = conflict_as("Department name already exists")(CrmError::conflict(
            "Duplicate entry 'Sales' for key 'department_name'",
        ));
        assert_eq!(err.to_string(), "Department name already exists");
    }
}
