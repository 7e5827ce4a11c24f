//! SQLite-backed store
//!
//! Uniqueness guarantees come from the schema in `migrations/`: a partial
//! unique index for open invitations, a unique `report_id` on decisions and a
//! status-guarded `UPDATE` for package transitions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::migrate::MigrateDatabase;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use super::{
    ExpiryScope, InviteRepository, MembershipRepository, PackageRepository, ProjectRepository,
    ReportApprovalRepository, ReportRepository, ScenarioRepository, StoreResult, UserRepository,
};
use crate::errors::StoreError;
use crate::model::{
    normalize_email, ApprovalId, Invitation, InvitationId, InvitationStatus, Membership,
    PackageId, PackageStatus,
    Project, ProjectId, ReportApproval, ReportId, ReportParent, Role, ScenarioId, ScenarioStatus,
    TestPackage, TestReport, TestScenario, User, UserId,
};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database and optionally run migrations
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        auto_migrate: bool,
    ) -> Result<Self, sqlx::Error> {
        if !sqlx::Sqlite::database_exists(database_url).await? {
            info!("Creating database at {}", database_url);
            sqlx::Sqlite::create_database(database_url).await?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        if auto_migrate {
            info!("Running database migrations...");
            sqlx::migrate!("./migrations").run(&pool).await?;
            info!("Database migrations completed");
        }

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close database connections gracefully
    pub async fn shutdown(&self) {
        info!("Shutting down database connections...");
        self.pool.close().await;
        info!("Database connections closed");
    }
}

fn backend(err: sqlx::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

/// Maps unique-constraint violations to `Duplicate`, everything else to
/// `Backend`. The violated columns are taken from the driver when it reports
/// them; `fallback` only labels violations it cannot attribute.
fn write_error(fallback: &'static str) -> impl Fn(sqlx::Error) -> StoreError {
    move |err| {
        if let sqlx::Error::Database(db) = &err {
            if db.is_unique_violation() {
                return StoreError::Duplicate {
                    constraint: violated_constraint(db.constraint(), db.message())
                        .unwrap_or_else(|| fallback.to_string()),
                };
            }
        }
        backend(err)
    }
}

/// SQLite names the columns in the message, e.g.
/// `UNIQUE constraint failed: invitations.token`
fn violated_constraint(named: Option<&str>, message: &str) -> Option<String> {
    named
        .or_else(|| message.strip_prefix("UNIQUE constraint failed: "))
        .map(|columns| columns.trim().to_string())
        .filter(|columns| !columns.is_empty())
}

fn millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_millis(ms: i64) -> StoreResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::Backend(format!("timestamp {ms} out of range")))
}

fn parse<T: std::str::FromStr>(raw: String) -> StoreResult<T>
where
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| StoreError::Backend(e.to_string()))
}

fn project_from_row(row: &SqliteRow) -> StoreResult<Project> {
    Ok(Project {
        id: ProjectId(row.try_get("id").map_err(backend)?),
        name: row.try_get("name").map_err(backend)?,
        owner_id: UserId(row.try_get("owner_id").map_err(backend)?),
    })
}

fn user_from_row(row: &SqliteRow) -> StoreResult<User> {
    Ok(User {
        id: UserId(row.try_get("id").map_err(backend)?),
        email: row.try_get("email").map_err(backend)?,
        name: row.try_get("name").map_err(backend)?,
    })
}

fn membership_from_row(row: &SqliteRow) -> StoreResult<Membership> {
    Ok(Membership {
        user_id: UserId(row.try_get("user_id").map_err(backend)?),
        project_id: ProjectId(row.try_get("project_id").map_err(backend)?),
        role: parse::<Role>(row.try_get("role").map_err(backend)?)?,
        joined_at: from_millis(row.try_get("joined_at").map_err(backend)?)?,
    })
}

fn invitation_from_row(row: &SqliteRow) -> StoreResult<Invitation> {
    Ok(Invitation {
        id: InvitationId(row.try_get("id").map_err(backend)?),
        project_id: ProjectId(row.try_get("project_id").map_err(backend)?),
        email: row.try_get("email").map_err(backend)?,
        role: parse::<Role>(row.try_get("role").map_err(backend)?)?,
        token: row.try_get("token").map_err(backend)?,
        status: parse::<InvitationStatus>(row.try_get("status").map_err(backend)?)?,
        invited_by_id: UserId(row.try_get("invited_by_id").map_err(backend)?),
        expires_at: from_millis(row.try_get("expires_at").map_err(backend)?)?,
        created_at: from_millis(row.try_get("created_at").map_err(backend)?)?,
    })
}

fn scenario_from_row(row: &SqliteRow) -> StoreResult<TestScenario> {
    let package_id: Option<String> = row.try_get("package_id").map_err(backend)?;
    let tester_id: Option<String> = row.try_get("tester_id").map_err(backend)?;
    let approver_id: Option<String> = row.try_get("approver_id").map_err(backend)?;
    Ok(TestScenario {
        id: ScenarioId(row.try_get("id").map_err(backend)?),
        project_id: ProjectId(row.try_get("project_id").map_err(backend)?),
        package_id: package_id.map(PackageId),
        title: row.try_get("title").map_err(backend)?,
        status: parse::<ScenarioStatus>(row.try_get("status").map_err(backend)?)?,
        tester_id: tester_id.map(UserId),
        approver_id: approver_id.map(UserId),
    })
}

fn package_from_row(row: &SqliteRow) -> StoreResult<TestPackage> {
    let assignee_id: Option<String> = row.try_get("assignee_id").map_err(backend)?;
    let approved_by_id: Option<String> = row.try_get("approved_by_id").map_err(backend)?;
    let approved_at: Option<i64> = row.try_get("approved_at").map_err(backend)?;
    let rejected_by_id: Option<String> = row.try_get("rejected_by_id").map_err(backend)?;
    let rejected_at: Option<i64> = row.try_get("rejected_at").map_err(backend)?;
    Ok(TestPackage {
        id: PackageId(row.try_get("id").map_err(backend)?),
        project_id: ProjectId(row.try_get("project_id").map_err(backend)?),
        title: row.try_get("title").map_err(backend)?,
        status: parse::<PackageStatus>(row.try_get("status").map_err(backend)?)?,
        assignee_id: assignee_id.map(UserId),
        approved_by_id: approved_by_id.map(UserId),
        approved_at: approved_at.map(from_millis).transpose()?,
        rejected_by_id: rejected_by_id.map(UserId),
        rejected_at: rejected_at.map(from_millis).transpose()?,
        rejection_reason: row.try_get("rejection_reason").map_err(backend)?,
    })
}

fn report_from_row(row: &SqliteRow) -> StoreResult<TestReport> {
    let scenario_id: Option<String> = row.try_get("scenario_id").map_err(backend)?;
    let package_id: Option<String> = row.try_get("package_id").map_err(backend)?;
    Ok(TestReport {
        id: ReportId(row.try_get("id").map_err(backend)?),
        parent: ReportParent::from_columns(scenario_id.map(ScenarioId), package_id.map(PackageId)),
        content: row.try_get("content").map_err(backend)?,
        checksum: row.try_get("checksum").map_err(backend)?,
        created_at: from_millis(row.try_get("created_at").map_err(backend)?)?,
    })
}

fn approval_from_row(row: &SqliteRow) -> StoreResult<ReportApproval> {
    Ok(ReportApproval {
        id: ApprovalId(row.try_get("id").map_err(backend)?),
        report_id: ReportId(row.try_get("report_id").map_err(backend)?),
        status: parse(row.try_get("status").map_err(backend)?)?,
        comment: row.try_get("comment").map_err(backend)?,
        approved_by: UserId(row.try_get("approved_by").map_err(backend)?),
        file_hash: row.try_get("file_hash").map_err(backend)?,
        approved_at: from_millis(row.try_get("approved_at").map_err(backend)?)?,
    })
}

#[async_trait]
impl ProjectRepository for SqliteStore {
    async fn find_project(&self, id: &ProjectId) -> StoreResult<Option<Project>> {
        let row = sqlx::query("SELECT id, name, owner_id FROM projects WHERE id = ?1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

        row.as_ref().map(project_from_row).transpose()
    }

    async fn insert_project(&self, project: Project) -> StoreResult<()> {
        sqlx::query("INSERT INTO projects (id, name, owner_id) VALUES (?1, ?2, ?3)")
            .bind(project.id.as_str())
            .bind(&project.name)
            .bind(project.owner_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(write_error("projects.id"))?;
        Ok(())
    }
}

#[async_trait]
impl UserRepository for SqliteStore {
    async fn find_user(&self, id: &UserId) -> StoreResult<Option<User>> {
        let row = sqlx::query("SELECT id, email, name FROM users WHERE id = ?1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query("SELECT id, email, name FROM users WHERE email = ?1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn insert_user(&self, user: User) -> StoreResult<()> {
        sqlx::query("INSERT INTO users (id, email, name) VALUES (?1, ?2, ?3)")
            .bind(user.id.as_str())
            .bind(normalize_email(&user.email))
            .bind(&user.name)
            .execute(&self.pool)
            .await
            .map_err(write_error("users.email"))?;
        Ok(())
    }
}

#[async_trait]
impl MembershipRepository for SqliteStore {
    async fn find_membership(
        &self,
        user_id: &UserId,
        project_id: &ProjectId,
    ) -> StoreResult<Option<Membership>> {
        let row = sqlx::query(
            r#"
            SELECT user_id, project_id, role, joined_at
            FROM memberships
            WHERE user_id = ?1 AND project_id = ?2
            "#,
        )
        .bind(user_id.as_str())
        .bind(project_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.as_ref().map(membership_from_row).transpose()
    }

    async fn insert_membership(&self, membership: Membership) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO memberships (user_id, project_id, role, joined_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(membership.user_id.as_str())
        .bind(membership.project_id.as_str())
        .bind(membership.role.as_str())
        .bind(millis(membership.joined_at))
        .execute(&self.pool)
        .await
        .map_err(write_error("memberships.user_id_project_id"))?;
        Ok(())
    }

    async fn delete_membership(
        &self,
        user_id: &UserId,
        project_id: &ProjectId,
    ) -> StoreResult<Option<Membership>> {
        let row = sqlx::query(
            r#"
            DELETE FROM memberships
            WHERE user_id = ?1 AND project_id = ?2
            RETURNING user_id, project_id, role, joined_at
            "#,
        )
        .bind(user_id.as_str())
        .bind(project_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.as_ref().map(membership_from_row).transpose()
    }
}

#[async_trait]
impl InviteRepository for SqliteStore {
    async fn find_pending(
        &self,
        project_id: &ProjectId,
        email: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Invitation>> {
        let row = sqlx::query(
            r#"
            SELECT id, project_id, email, role, token, status, invited_by_id, expires_at, created_at
            FROM invitations
            WHERE project_id = ?1 AND email = ?2 AND status = 'PENDING' AND expires_at > ?3
            LIMIT 1
            "#,
        )
        .bind(project_id.as_str())
        .bind(email)
        .bind(millis(now))
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.as_ref().map(invitation_from_row).transpose()
    }

    async fn insert_invitation(&self, invitation: Invitation) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO invitations
                (id, project_id, email, role, token, status, invited_by_id, expires_at, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(invitation.id.as_str())
        .bind(invitation.project_id.as_str())
        .bind(&invitation.email)
        .bind(invitation.role.as_str())
        .bind(&invitation.token)
        .bind(invitation.status.as_str())
        .bind(invitation.invited_by_id.as_str())
        .bind(millis(invitation.expires_at))
        .bind(millis(invitation.created_at))
        .execute(&self.pool)
        .await
        .map_err(write_error("invitations"))?;
        Ok(())
    }

    async fn expire_stale(&self, scope: ExpiryScope, now: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE invitations
            SET status = 'EXPIRED'
            WHERE status = 'PENDING'
              AND expires_at <= ?1
              AND (?2 IS NULL OR project_id = ?2)
              AND (?3 IS NULL OR email = ?3)
            "#,
        )
        .bind(millis(now))
        .bind(scope.project_id.as_ref().map(|p| p.as_str()))
        .bind(scope.email.as_deref())
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        debug!(archived = result.rows_affected(), "Archived stale invitations");
        Ok(result.rows_affected())
    }

    async fn list_invitations(
        &self,
        project_id: &ProjectId,
        email: &str,
    ) -> StoreResult<Vec<Invitation>> {
        let rows = sqlx::query(
            r#"
            SELECT id, project_id, email, role, token, status, invited_by_id, expires_at, created_at
            FROM invitations
            WHERE project_id = ?1 AND email = ?2
            ORDER BY created_at ASC
            "#,
        )
        .bind(project_id.as_str())
        .bind(email)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.iter().map(invitation_from_row).collect()
    }
}

#[async_trait]
impl ScenarioRepository for SqliteStore {
    async fn find_scenario(&self, id: &ScenarioId) -> StoreResult<Option<TestScenario>> {
        let row = sqlx::query(
            r#"
            SELECT id, project_id, package_id, title, status, tester_id, approver_id
            FROM test_scenarios
            WHERE id = ?1
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.as_ref().map(scenario_from_row).transpose()
    }

    async fn list_for_package(&self, package_id: &PackageId) -> StoreResult<Vec<TestScenario>> {
        let rows = sqlx::query(
            r#"
            SELECT id, project_id, package_id, title, status, tester_id, approver_id
            FROM test_scenarios
            WHERE package_id = ?1
            ORDER BY id ASC
            "#,
        )
        .bind(package_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.iter().map(scenario_from_row).collect()
    }

    async fn insert_scenario(&self, scenario: TestScenario) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO test_scenarios
                (id, project_id, package_id, title, status, tester_id, approver_id)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(scenario.id.as_str())
        .bind(scenario.project_id.as_str())
        .bind(scenario.package_id.as_ref().map(|p| p.as_str()))
        .bind(&scenario.title)
        .bind(scenario.status.as_str())
        .bind(scenario.tester_id.as_ref().map(|u| u.as_str()))
        .bind(scenario.approver_id.as_ref().map(|u| u.as_str()))
        .execute(&self.pool)
        .await
        .map_err(write_error("test_scenarios.id"))?;
        Ok(())
    }
}

#[async_trait]
impl PackageRepository for SqliteStore {
    async fn find_package(
        &self,
        id: &PackageId,
        project_id: &ProjectId,
    ) -> StoreResult<Option<TestPackage>> {
        let row = sqlx::query(
            r#"
            SELECT id, project_id, title, status, assignee_id, approved_by_id, approved_at,
                   rejected_by_id, rejected_at, rejection_reason
            FROM test_packages
            WHERE id = ?1 AND project_id = ?2
            "#,
        )
        .bind(id.as_str())
        .bind(project_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.as_ref().map(package_from_row).transpose()
    }

    async fn find_package_by_id(&self, id: &PackageId) -> StoreResult<Option<TestPackage>> {
        let row = sqlx::query(
            r#"
            SELECT id, project_id, title, status, assignee_id, approved_by_id, approved_at,
                   rejected_by_id, rejected_at, rejection_reason
            FROM test_packages
            WHERE id = ?1
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.as_ref().map(package_from_row).transpose()
    }

    async fn save_transition(
        &self,
        package: TestPackage,
        expected: PackageStatus,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE test_packages
            SET status = ?1,
                approved_by_id = ?2,
                approved_at = ?3,
                rejected_by_id = ?4,
                rejected_at = ?5,
                rejection_reason = ?6
            WHERE id = ?7
              AND status = ?8
              AND (
                  ?1 <> 'APROVADO'
                  OR (
                      EXISTS (SELECT 1 FROM test_scenarios WHERE package_id = ?7)
                      AND NOT EXISTS (
                          SELECT 1 FROM test_scenarios
                          WHERE package_id = ?7 AND status <> 'APPROVED'
                      )
                  )
              )
            "#,
        )
        .bind(package.status.as_str())
        .bind(package.approved_by_id.as_ref().map(|u| u.as_str()))
        .bind(package.approved_at.map(millis))
        .bind(package.rejected_by_id.as_ref().map(|u| u.as_str()))
        .bind(package.rejected_at.map(millis))
        .bind(package.rejection_reason.as_deref())
        .bind(package.id.as_str())
        .bind(expected.as_str())
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        let exists = sqlx::query("SELECT 1 FROM test_packages WHERE id = ?1")
            .bind(package.id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .is_some();
        if exists {
            Err(StoreError::StaleState {
                entity: format!("test package {}", package.id),
            })
        } else {
            Err(StoreError::Backend(format!("test package {} vanished", package.id)))
        }
    }

    async fn insert_package(&self, package: TestPackage) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO test_packages
                (id, project_id, title, status, assignee_id, approved_by_id, approved_at,
                 rejected_by_id, rejected_at, rejection_reason)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(package.id.as_str())
        .bind(package.project_id.as_str())
        .bind(&package.title)
        .bind(package.status.as_str())
        .bind(package.assignee_id.as_ref().map(|u| u.as_str()))
        .bind(package.approved_by_id.as_ref().map(|u| u.as_str()))
        .bind(package.approved_at.map(millis))
        .bind(package.rejected_by_id.as_ref().map(|u| u.as_str()))
        .bind(package.rejected_at.map(millis))
        .bind(package.rejection_reason.as_deref())
        .execute(&self.pool)
        .await
        .map_err(write_error("test_packages.id"))?;
        Ok(())
    }
}

#[async_trait]
impl ReportRepository for SqliteStore {
    async fn find_report(&self, id: &ReportId) -> StoreResult<Option<TestReport>> {
        let row = sqlx::query(
            r#"
            SELECT id, scenario_id, package_id, content, checksum, created_at
            FROM test_reports
            WHERE id = ?1
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.as_ref().map(report_from_row).transpose()
    }

    async fn insert_report(&self, report: TestReport) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO test_reports (id, scenario_id, package_id, content, checksum, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(report.id.as_str())
        .bind(report.parent.scenario_id().map(|s| s.as_str()))
        .bind(report.parent.package_id().map(|p| p.as_str()))
        .bind(&report.content)
        .bind(&report.checksum)
        .bind(millis(report.created_at))
        .execute(&self.pool)
        .await
        .map_err(write_error("test_reports.id"))?;
        Ok(())
    }
}

#[async_trait]
impl ReportApprovalRepository for SqliteStore {
    async fn find_for_report(&self, report_id: &ReportId) -> StoreResult<Option<ReportApproval>> {
        let row = sqlx::query(
            r#"
            SELECT id, report_id, status, comment, approved_by, file_hash, approved_at
            FROM report_approvals
            WHERE report_id = ?1
            "#,
        )
        .bind(report_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.as_ref().map(approval_from_row).transpose()
    }

    async fn record_decision(
        &self,
        approval: ReportApproval,
        scenario: Option<(ScenarioId, ScenarioStatus)>,
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        sqlx::query(
            r#"
            INSERT INTO report_approvals
                (id, report_id, status, comment, approved_by, file_hash, approved_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(approval.id.as_str())
        .bind(approval.report_id.as_str())
        .bind(approval.status.as_str())
        .bind(&approval.comment)
        .bind(approval.approved_by.as_str())
        .bind(&approval.file_hash)
        .bind(millis(approval.approved_at))
        .execute(&mut *tx)
        .await
        .map_err(write_error("report_approvals.report_id"))?;

        if let Some((scenario_id, status)) = scenario {
            let result = sqlx::query("UPDATE test_scenarios SET status = ?1 WHERE id = ?2")
                .bind(status.as_str())
                .bind(scenario_id.as_str())
                .execute(&mut *tx)
                .await
                .map_err(backend)?;
            if result.rows_affected() == 0 {
                // dropping `tx` rolls the decision back
                return Err(StoreError::Backend(format!("scenario {scenario_id} vanished")));
            }
        }

        tx.commit().await.map_err(backend)?;
        debug!(report.id = %approval.report_id, "Decision recorded");
        Ok(())
    }
}
