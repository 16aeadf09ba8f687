//! Replication Progress Tracker
//!
//! 쓰기 유닛 오브 워크마다 복제 토큰을 발급해 `replication_log`에 남기고,
//! 그 토큰이 Replica에 보이는지 확인합니다.
//!
//! 토큰 상태는 `Issued` → `Visible` 한 방향으로만 바뀝니다. 이 모듈은 기다리지 않습니다.
//! 얼마나 기다릴지는 호출자가 정합니다.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::data_source::RoutingDataSource;
use super::endpoint::Endpoint;
use super::error::{RoutingError, RoutingResult};
use super::intent::UnitOfWorkIntent;
use super::token::ReplicationToken;
use super::unit_of_work::UnitOfWork;
use crate::backend::{Row, SelectStatement, Statement};

/// 복제 로그 테이블
pub const REPLICATION_LOG_TABLE: &str = "replication_log";

const COL_ID: &str = "id";
const COL_TOKEN: &str = "replication_token";
const COL_EVENT_KIND: &str = "event_kind";
const COL_TARGET_ENTITY: &str = "target_entity";
const COL_RECORDED_AT: &str = "recorded_at";

// ============================================================================
// EventKind - 이벤트 종류
// ============================================================================

/// 기록되는 쓰기 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventKind {
    Insert,
    Update,
    Delete,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Insert => "INSERT",
            EventKind::Update => "UPDATE",
            EventKind::Delete => "DELETE",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = RoutingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "INSERT" => Ok(EventKind::Insert),
            "UPDATE" => Ok(EventKind::Update),
            "DELETE" => Ok(EventKind::Delete),
            _ => Err(RoutingError::type_conversion(format!("Unknown event kind: {}", s))),
        }
    }
}

// ============================================================================
// ReplicationRecord - 복제 로그 항목
// ============================================================================

/// 복제 로그 항목 (추가만 되고 수정/삭제되지 않음)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationRecord {
    /// 로그 행 ID
    pub id: i64,
    /// 유닛 오브 워크 전체의 복제 토큰
    pub token: ReplicationToken,
    /// 이벤트 종류
    pub event_kind: EventKind,
    /// 대상 엔티티 (테이블)
    pub target_entity: String,
    /// 기록 시각 (Primary 기준, 그대로 복제됨)
    pub recorded_at: DateTime<Utc>,
}

impl ReplicationRecord {
    fn to_row(&self) -> Row {
        Row::new()
            .with(COL_TOKEN, self.token.to_string())
            .with(COL_EVENT_KIND, self.event_kind.as_str())
            .with(COL_TARGET_ENTITY, self.target_entity.as_str())
            .with(COL_RECORDED_AT, self.recorded_at)
    }

    fn from_row(row: &Row) -> RoutingResult<Self> {
        let recorded_at = row
            .get_timestamp(COL_RECORDED_AT)?
            .ok_or_else(|| RoutingError::type_conversion("replication_log.recorded_at is NULL"))?;

        Ok(Self {
            id: row.get_int(COL_ID)?,
            token: row.get_str(COL_TOKEN)?.parse::<ReplicationToken>()?,
            event_kind: row.get_str(COL_EVENT_KIND)?.parse::<EventKind>()?,
            target_entity: row.get_str(COL_TARGET_ENTITY)?.to_string(),
            recorded_at,
        })
    }
}

// ============================================================================
// ReplicationTracker
// ============================================================================

/// 복제 진행 추적기
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplicationTracker;

impl ReplicationTracker {
    pub fn new() -> Self {
        Self
    }

    /// 현재 쓰기 유닛 오브 워크의 토큰으로 로그 항목 기록
    ///
    /// 비즈니스 쓰기 뒤, 커밋 전에 같은 유닛 오브 워크 안에서 호출합니다.
    /// 로그 항목은 비즈니스 쓰기와 함께 커밋되거나 함께 롤백됩니다.
    /// 유닛 오브 워크 하나에 항목은 하나뿐입니다.
    pub async fn issue_and_record(
        &self,
        uow: &mut UnitOfWork,
        event_kind: EventKind,
        target_entity: &str,
    ) -> RoutingResult<ReplicationRecord> {
        if uow.has_replication_record() {
            return Err(RoutingError::unit_of_work(
                "A replication record was already issued in this unit of work",
            ));
        }
        // 연결을 건드리기 전에 확인하므로 거부되어도 유닛 오브 워크는 Active로 남는다
        if uow.target_endpoint() != Endpoint::Primary {
            return Err(RoutingError::unit_of_work(
                "Replication records can only be issued in a unit of work routed to the primary",
            ));
        }

        let token = uow.replication_position().await?;
        let mut record = ReplicationRecord {
            id: 0,
            token,
            event_kind,
            target_entity: target_entity.to_string(),
            recorded_at: Utc::now(),
        };
        let result = uow
            .execute(Statement::insert(REPLICATION_LOG_TABLE, record.to_row()))
            .await?;
        record.id = result
            .last_insert_id
            .ok_or_else(|| RoutingError::internal("replication_log insert returned no id"))?;
        uow.mark_replication_recorded();

        tracing::debug!(
            token = %record.token,
            event_kind = %record.event_kind,
            target_entity = %record.target_entity,
            "replication record issued"
        );
        Ok(record)
    }

    /// 토큰이 Replica에 보이는지 (읽기 전용 유닛 오브 워크 하나, 쿼리 하나)
    ///
    /// 아직 도달하지 않았으면 `false`이며 에러가 아닙니다.
    pub async fn has_reached(
        &self,
        data_source: &RoutingDataSource,
        token: &ReplicationToken,
    ) -> RoutingResult<bool> {
        let mut uow = data_source.begin_with(UnitOfWorkIntent::ReadOnly);
        let result = self.has_reached_in(&mut uow, token).await;
        uow.complete(result).await
    }

    /// 호출자가 연 유닛 오브 워크 안에서 도달 여부 확인
    ///
    /// 유닛 오브 워크는 Replica로 라우팅되어야 합니다 (읽기 전용 의도).
    /// Primary에서는 항상 보이므로 `UnitOfWork` 에러로 거부합니다.
    pub async fn has_reached_in(
        &self,
        uow: &mut UnitOfWork,
        token: &ReplicationToken,
    ) -> RoutingResult<bool> {
        if uow.target_endpoint() != Endpoint::Replica {
            return Err(RoutingError::unit_of_work(
                "Replication progress can only be checked in a unit of work routed to the replica",
            ));
        }

        let select = SelectStatement::new(REPLICATION_LOG_TABLE).where_eq(COL_TOKEN, token.to_string());
        let result = uow.execute(Statement::Count(select)).await?;
        let reached = result.count.unwrap_or(0) > 0;

        tracing::trace!(token = %token, reached, endpoint = ?uow.endpoint(), "replication check");
        Ok(reached)
    }

    /// 최근 로그 항목 (최신순)
    pub async fn recent_records(
        &self,
        data_source: &RoutingDataSource,
        limit: usize,
    ) -> RoutingResult<Vec<ReplicationRecord>> {
        let mut uow = data_source.begin_with(UnitOfWorkIntent::ReadOnly);
        let select = SelectStatement::new(REPLICATION_LOG_TABLE)
            .newest_first()
            .limit(limit);

        let result = match uow.execute(select.into()).await {
            Ok(result) => result
                .rows
                .iter()
                .map(ReplicationRecord::from_row)
                .collect::<RoutingResult<Vec<_>>>(),
            Err(e) => Err(e),
        };
        uow.complete(result).await
    }
}
