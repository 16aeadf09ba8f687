//! Deferred Acquisition
//!
//! 유닛 오브 워크가 시작될 때가 아니라 첫 연산이 실행될 때 연결을 획득합니다.
//! 라우팅 결정은 리졸버를 한 번 호출한 결과로 고정되고, 바인딩된 엔드포인트는
//! 유닛 오브 워크가 끝날 때까지 바뀌지 않습니다.

use std::fmt;
use std::sync::Arc;

use super::endpoint::Endpoint;
use super::error::{RoutingError, RoutingResult};
use super::pool::{EndpointPool, PooledConnection};
use super::router::RoutingDecision;
use crate::backend::Connection;

/// 첫 사용 시 한 번 호출되는 라우팅 리졸버
pub type Resolver = Box<dyn FnOnce() -> RoutingDecision + Send>;

/// 지연 바인딩 연결
pub struct DeferredConnection {
    pools: Arc<EndpointPool>,
    resolver: Option<Resolver>,
    decision: Option<RoutingDecision>,
    connection: Option<PooledConnection>,
}

impl DeferredConnection {
    /// 새 지연 연결 (아직 아무 연결도 획득하지 않음)
    pub fn new(pools: Arc<EndpointPool>, resolver: Resolver) -> Self {
        Self {
            pools,
            resolver: Some(resolver),
            decision: None,
            connection: None,
        }
    }

    /// 물리 연결이 바인딩되었는지
    pub fn is_bound(&self) -> bool {
        self.connection.is_some()
    }

    /// 고정된 라우팅 결정 (아직 사용 전이면 None)
    pub fn decision(&self) -> Option<RoutingDecision> {
        self.decision
    }

    /// 바인딩된 엔드포인트
    pub fn endpoint(&self) -> Option<Endpoint> {
        self.connection.as_ref().map(PooledConnection::endpoint)
    }

    /// 연결 가져오기
    ///
    /// 처음 호출될 때 라우팅을 결정하고, 그 엔드포인트에서 연결을 획득한 뒤
    /// 트랜잭션을 시작합니다. 획득에 실패해도 다른 엔드포인트로 대체하지 않습니다.
    pub async fn get(&mut self) -> RoutingResult<&mut (dyn Connection + 'static)> {
        if self.connection.is_none() {
            let decision = self.resolve()?;
            let mut conn = self.pools.acquire(decision.endpoint).await?;
            conn.connection()?.begin(decision.is_read_only()).await?;

            tracing::debug!(
                endpoint = %decision.endpoint,
                connection = conn.id(),
                read_only = decision.is_read_only(),
                "connection bound"
            );
            self.connection = Some(conn);
        }

        match self.connection.as_mut() {
            Some(conn) => conn.connection(),
            None => Err(RoutingError::internal("deferred connection lost its binding")),
        }
    }

    /// 라우팅 결정 (한 번만 계산)
    fn resolve(&mut self) -> RoutingResult<RoutingDecision> {
        if let Some(decision) = self.decision {
            return Ok(decision);
        }

        let resolver = self
            .resolver
            .take()
            .ok_or_else(|| RoutingError::internal("routing resolver already consumed"))?;
        let decision = resolver();
        self.decision = Some(decision);
        Ok(decision)
    }

    /// 커밋 후 연결 반환 (바인딩되지 않았으면 아무것도 하지 않음)
    pub async fn commit(&mut self) -> RoutingResult<()> {
        let Some(mut conn) = self.connection.take() else {
            return Ok(());
        };

        let result = conn.connection()?.commit().await;
        conn.release();
        result
    }

    /// 롤백 후 연결 반환 (바인딩되지 않았으면 아무것도 하지 않음)
    pub async fn rollback(&mut self) -> RoutingResult<()> {
        let Some(mut conn) = self.connection.take() else {
            return Ok(());
        };

        let result = conn.connection()?.rollback().await;
        conn.release();
        result
    }
}

impl fmt::Debug for DeferredConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredConnection")
            .field("decision", &self.decision)
            .field("connection", &self.connection)
            .finish()
    }
}
