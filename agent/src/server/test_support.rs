//! 测试用的内存实现与 V2Ray gRPC 模拟服务

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use prost::Message;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::{Request, Response, Status};

use common::config::V2rayConfig;
use common::grpc::{
    self, proxyman, stats, HandlerService, HandlerServiceServer, StatsService, StatsServiceServer,
    VmessAccount,
};
use common::protocol::control::{AddUserError, ConfigStoreError, ProxyController, RemoveUserError};
use common::protocol::directory::{DirectoryClient, DirectoryUnavailable, SubmitOutcome};
use common::protocol::traffic::{TrafficRecord, TrafficSnapshot};
use common::protocol::user::User;

/// 记录下来的代理操作，用于断言调用顺序
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    AddLive(String),
    RemoveLive(String),
    ReadConfig,
    WriteConfig,
    ReadTraffic { reset: bool },
}

#[derive(Default)]
struct MockControllerState {
    live: Vec<String>,
    config: Option<V2rayConfig>,
    add_failures: HashMap<String, AddUserError>,
    remove_failures: HashMap<String, RemoveUserError>,
    traffic: VecDeque<Result<TrafficSnapshot, String>>,
    fail_write: bool,
    calls: Vec<Call>,
}

/// 内存中的代理：运行中的用户列表 + 持久化配置
#[derive(Default)]
pub struct MockController {
    state: Mutex<MockControllerState>,
}

impl MockController {
    /// 运行中的代理与配置文件都包含 `live` 中的用户
    pub fn with_users(tag: &str, live: &[&str]) -> Self {
        let clients: Vec<serde_json::Value> = live
            .iter()
            .map(|id| serde_json::json!({"id": id, "email": id, "level": 0, "alterId": 0}))
            .collect();
        let config: V2rayConfig = serde_json::from_value(serde_json::json!({
            "inbounds": [
                {"tag": "api", "settings": {}},
                {"tag": tag, "protocol": "vmess", "settings": {"clients": clients}}
            ]
        }))
        .unwrap();

        let mock = Self::default();
        {
            let mut state = mock.state.lock().unwrap();
            state.live = live.iter().map(|s| s.to_string()).collect();
            state.config = Some(config);
        }
        mock
    }

    pub fn set_live(&self, live: &[&str]) {
        self.state.lock().unwrap().live = live.iter().map(|s| s.to_string()).collect();
    }

    pub fn set_config(&self, config: Option<V2rayConfig>) {
        self.state.lock().unwrap().config = config;
    }

    pub fn fail_add(&self, user_id: &str, err: AddUserError) {
        self.state.lock().unwrap().add_failures.insert(user_id.to_string(), err);
    }

    pub fn fail_remove(&self, user_id: &str, err: RemoveUserError) {
        self.state.lock().unwrap().remove_failures.insert(user_id.to_string(), err);
    }

    /// 之后的写配置都失败
    pub fn fail_write(&self) {
        self.state.lock().unwrap().fail_write = true;
    }

    pub fn push_traffic(&self, snapshot: TrafficSnapshot) {
        self.state.lock().unwrap().traffic.push_back(Ok(snapshot));
    }

    pub fn push_traffic_error(&self, message: &str) {
        self.state.lock().unwrap().traffic.push_back(Err(message.to_string()));
    }

    pub fn live(&self) -> Vec<String> {
        self.state.lock().unwrap().live.clone()
    }

    pub fn config(&self) -> Option<V2rayConfig> {
        self.state.lock().unwrap().config.clone()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    /// 产生变更的调用（实时增删与写配置）
    pub fn mutations(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::AddLive(_) | Call::RemoveLive(_) | Call::WriteConfig))
            .collect()
    }
}

#[async_trait]
impl ProxyController for MockController {
    async fn add_live_user(&self, _inbound_tag: &str, user: &User) -> Result<(), AddUserError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::AddLive(user.user_id.clone()));

        if let Some(err) = state.add_failures.get(&user.user_id) {
            return Err(err.clone());
        }
        if state.live.contains(&user.user_id) {
            return Err(AddUserError::AlreadyExists);
        }
        state.live.push(user.user_id.clone());
        Ok(())
    }

    async fn remove_live_user(&self, _inbound_tag: &str, user_id: &str) -> Result<(), RemoveUserError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::RemoveLive(user_id.to_string()));

        if let Some(err) = state.remove_failures.get(user_id) {
            return Err(err.clone());
        }
        match state.live.iter().position(|id| id == user_id) {
            Some(pos) => {
                state.live.remove(pos);
                Ok(())
            }
            None => Err(RemoveUserError::NotFound),
        }
    }

    async fn read_all_traffic(&self, reset: bool) -> anyhow::Result<TrafficSnapshot> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::ReadTraffic { reset });

        match state.traffic.pop_front() {
            Some(Ok(snapshot)) => Ok(snapshot),
            Some(Err(message)) => Err(anyhow::anyhow!(message)),
            None => Ok(TrafficSnapshot::default()),
        }
    }

    async fn read_persisted_config(&self) -> Result<V2rayConfig, ConfigStoreError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::ReadConfig);

        state.config.clone().ok_or_else(|| ConfigStoreError::Unreadable {
            path: "config.json".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        })
    }

    async fn write_persisted_config(&self, config: &V2rayConfig) -> Result<(), ConfigStoreError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::WriteConfig);
        if state.fail_write {
            return Err(ConfigStoreError::WriteFailed {
                path: "config.json".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            });
        }
        state.config = Some(config.clone());
        Ok(())
    }
}

/// 内存中的用户目录
pub struct MockDirectory {
    users: Mutex<Result<Vec<User>, DirectoryUnavailable>>,
    outcomes: Mutex<VecDeque<SubmitOutcome>>,
    submitted: Mutex<Vec<TrafficRecord>>,
}

impl MockDirectory {
    pub fn new(users: Vec<User>) -> Self {
        Self {
            users: Mutex::new(Ok(users)),
            outcomes: Mutex::new(VecDeque::new()),
            submitted: Mutex::new(Vec::new()),
        }
    }

    pub fn unavailable() -> Self {
        let directory = Self::new(Vec::new());
        *directory.users.lock().unwrap() = Err(DirectoryUnavailable("status 500".to_string()));
        directory
    }

    /// 依次返回的上报结果，用完后默认 Accepted
    pub fn push_outcome(&self, outcome: SubmitOutcome) {
        self.outcomes.lock().unwrap().push_back(outcome);
    }

    pub fn submitted(&self) -> Vec<TrafficRecord> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl DirectoryClient for MockDirectory {
    async fn fetch_desired_users(&self) -> Result<Vec<User>, DirectoryUnavailable> {
        self.users.lock().unwrap().clone()
    }

    async fn submit_traffic(&self, record: &TrafficRecord) -> SubmitOutcome {
        self.submitted.lock().unwrap().push(record.clone());
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(SubmitOutcome::Accepted)
    }
}

pub fn user(id: &str, level: u32, alter_id: u32) -> User {
    User {
        user_id: id.to_string(),
        level,
        alter_id,
    }
}

/// 模拟 V2Ray 的 HandlerService 与 StatsService
#[derive(Default)]
pub struct FakeV2ray {
    // tag -> email -> (level, account id, alter_id)
    inbounds: Mutex<HashMap<String, HashMap<String, (u32, String, u32)>>>,
    stats: Mutex<Vec<(String, i64)>>,
}

impl FakeV2ray {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn account(&self, tag: &str, email: &str) -> Option<(u32, String, u32)> {
        self.inbounds
            .lock()
            .unwrap()
            .get(tag)
            .and_then(|users| users.get(email))
            .cloned()
    }

    pub fn set_stat(&self, name: &str, value: i64) {
        let mut stats = self.stats.lock().unwrap();
        match stats.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = value,
            None => stats.push((name.to_string(), value)),
        }
    }
}

#[tonic::async_trait]
impl HandlerService for FakeV2ray {
    async fn alter_inbound(
        &self,
        request: Request<proxyman::AlterInboundRequest>,
    ) -> Result<Response<proxyman::AlterInboundResponse>, Status> {
        let req = request.into_inner();
        let operation = req
            .operation
            .ok_or_else(|| Status::invalid_argument("missing operation"))?;
        let mut inbounds = self.inbounds.lock().unwrap();
        let users = inbounds.entry(req.tag).or_default();

        match operation.r#type.as_str() {
            grpc::ADD_USER_OPERATION => {
                let op = proxyman::AddUserOperation::decode(operation.value.as_slice())
                    .map_err(|e| Status::invalid_argument(e.to_string()))?;
                let user = op.user.ok_or_else(|| Status::invalid_argument("missing user"))?;
                if users.contains_key(&user.email) {
                    return Err(Status::unknown(format!(
                        "app/proxyman/inbound: User {} already exists.",
                        user.email
                    )));
                }
                let account = user
                    .account
                    .filter(|a| a.r#type == grpc::VMESS_ACCOUNT)
                    .ok_or_else(|| Status::invalid_argument("missing vmess account"))?;
                let account = VmessAccount::decode(account.value.as_slice())
                    .map_err(|e| Status::invalid_argument(e.to_string()))?;
                users.insert(user.email, (user.level, account.id, account.alter_id));
            }
            grpc::REMOVE_USER_OPERATION => {
                let op = proxyman::RemoveUserOperation::decode(operation.value.as_slice())
                    .map_err(|e| Status::invalid_argument(e.to_string()))?;
                if users.remove(&op.email).is_none() {
                    return Err(Status::unknown(format!(
                        "app/proxyman/inbound: User {} not found.",
                        op.email
                    )));
                }
            }
            other => return Err(Status::unimplemented(other.to_string())),
        }

        Ok(Response::new(proxyman::AlterInboundResponse {}))
    }
}

#[tonic::async_trait]
impl StatsService for FakeV2ray {
    async fn query_stats(
        &self,
        request: Request<stats::QueryStatsRequest>,
    ) -> Result<Response<stats::QueryStatsResponse>, Status> {
        let req = request.into_inner();
        let mut entries = self.stats.lock().unwrap();

        let stat = entries
            .iter()
            .filter(|(name, _)| name.contains(&req.pattern))
            .map(|(name, value)| stats::Stat {
                name: name.clone(),
                value: *value,
            })
            .collect();

        if req.reset {
            for entry in entries.iter_mut().filter(|(name, _)| name.contains(&req.pattern)) {
                entry.1 = 0;
            }
        }

        Ok(Response::new(stats::QueryStatsResponse { stat }))
    }
}

/// 在随机端口上启动模拟服务，返回 gRPC 地址
pub async fn spawn_fake_v2ray(fake: Arc<FakeV2ray>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        tonic::transport::Server::builder()
            .add_service(HandlerServiceServer::from_arc(fake.clone()))
            .add_service(StatsServiceServer::from_arc(fake))
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .unwrap();
    });

    format!("http://{}", addr)
}
