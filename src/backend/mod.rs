//! Backend Module
//!
//! 실제 데이터베이스와의 경계입니다. 코어는 이 트레이트만 사용합니다.
//!
//! - [`Connector`] - 엔드포인트별 물리 연결 생성
//! - [`Connection`] - 트랜잭션 제어, 구문 실행, 복제 위치 조회
//! - [`memory`] - 비동기 지연 복제 채널을 가진 인-프로세스 Primary/Replica 쌍

pub mod memory;
mod statement;
mod value;

use futures::future::BoxFuture;

use crate::routing::{Endpoint, EndpointConfig, ReplicationToken, RoutingResult};

pub use statement::{SelectStatement, SortOrder, Statement, StatementResult};
pub use value::{Row, Value};

/// 물리 연결
///
/// 하나의 연결은 한 번에 하나의 트랜잭션만 가집니다.
pub trait Connection: Send {
    /// 트랜잭션 시작
    fn begin(&mut self, read_only: bool) -> BoxFuture<'_, RoutingResult<()>>;

    /// 구문 실행
    fn execute(&mut self, statement: Statement) -> BoxFuture<'_, RoutingResult<StatementResult>>;

    /// 현재 트랜잭션이 커밋될 복제 위치
    ///
    /// Primary에서만 의미가 있으며, 같은 트랜잭션 안에서는 항상 같은 토큰을 돌려줍니다.
    /// 토큰은 처음 요청될 때 예약되고, 트랜잭션이 커밋되면 그 토큰으로 복제됩니다.
    /// 동시에 진행되는 트랜잭션 사이에서 토큰 순서와 커밋(적용) 순서는 다를 수 있으므로
    /// 도달 여부는 토큰 하나 단위로만 판단해야 합니다.
    fn replication_position(&mut self) -> BoxFuture<'_, RoutingResult<ReplicationToken>>;

    /// 커밋
    fn commit(&mut self) -> BoxFuture<'_, RoutingResult<()>>;

    /// 롤백
    fn rollback(&mut self) -> BoxFuture<'_, RoutingResult<()>>;

    /// 연결 확인
    fn ping(&mut self) -> BoxFuture<'_, RoutingResult<()>>;

    /// 트랜잭션 진행 중 여부
    fn in_transaction(&self) -> bool;
}

/// 엔드포인트별 연결 생성기
pub trait Connector: Send + Sync {
    /// 새 물리 연결
    fn connect<'a>(
        &'a self,
        endpoint: Endpoint,
        config: &'a EndpointConfig,
    ) -> BoxFuture<'a, RoutingResult<Box<dyn Connection>>>;
}
