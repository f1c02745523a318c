//! 시나리오 설계 문서 — design.yml 파싱 및 검증
//!
//! 설계 문서는 스토리지 URI, 호스트 목록, 워커 설정 조각, 조건→액션 시퀀스를 담습니다.
//! 검증은 어떤 외부 자원도 건드리기 전에 실패하며, 에러는 모두
//! [`ConfigError::InvalidValue`]로 해당 필드 경로를 포함합니다.
//!
//! ```yaml
//! storage: mongodb://127.0.0.1:27017/gauntlet
//! hosts:
//!   - weight: 3
//!     local: true
//! worker-config:
//!   common: |
//!     network: test
//!   n0:
//! sequences:
//!   - condition: '{"m": "gauntlet ready"}'
//!     action:
//!       name: start-workers
//!   - condition:
//!       query: '{"worker": "n0", "x.height": 3}'
//!     register:
//!       type: last_match
//!       to: n0_height
//! exit-on-error: true
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ConfigError, GauntletError, QueryError};
use crate::template;
use crate::types::SYSTEM_ALIAS;
use crate::uri::StorageUri;

/// `storage`가 비어 있을 때 사용하는 기본 스토리지
pub const DEFAULT_STORAGE_URI: &str = "mongodb://127.0.0.1:27017/gauntlet";

/// 로그가 저장되는 기본 컬렉션
pub const DEFAULT_COLLECTION: &str = "log";

/// 워커 설정 조각 중 모든 워커에 공통으로 적용되는 키
pub const COMMON_CONFIG_KEY: &str = "common";

/// 지원하는 유일한 register 타입
pub const REGISTER_LAST_MATCH: &str = "last_match";

/// 시나리오 설계 문서
#[derive(Debug, Clone)]
pub struct Design {
    pub storage: StorageUri,
    pub hosts: Vec<DesignHost>,
    /// 워커 alias → YAML 설정 조각 (정렬된 순서)
    pub worker_config: BTreeMap<String, String>,
    /// 모든 워커에 공통인 YAML 설정 조각
    pub common_config: String,
    pub sequences: Vec<SequenceSpec>,
    pub exit_on_error: bool,
}

impl Design {
    /// 파일에서 설계 문서를 읽고 검증합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, GauntletError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                GauntletError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                GauntletError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// YAML 문자열에서 설계 문서를 파싱하고 검증합니다.
    pub fn parse(yaml: &str) -> Result<Self, GauntletError> {
        let raw: RawDesign = serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseFailed {
            reason: e.to_string(),
        })?;
        Ok(raw.into_design()?)
    }

    /// 워커 alias 목록 (정렬됨)
    pub fn workers(&self) -> Vec<String> {
        self.worker_config.keys().cloned().collect()
    }

    /// 가중치가 0보다 큰 호스트만
    pub fn weighted_hosts(&self) -> impl Iterator<Item = &DesignHost> {
        self.hosts.iter().filter(|h| h.weight > 0)
    }
}

/// 설계 문서의 호스트
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesignHost {
    /// 0이면 워커를 받지 않습니다.
    pub weight: u32,
    pub local: bool,
    /// 호스트 주소
    pub host: String,
    pub ssh: Option<SshCredentials>,
}

impl DesignHost {
    /// 설계 문서에 호스트가 없을 때 사용하는 로컬 호스트
    pub fn local_default() -> Self {
        Self {
            weight: 1,
            local: true,
            host: "localhost".to_owned(),
            ssh: None,
        }
    }
}

/// 원격 호스트 접속 정보
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshCredentials {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub key: String,
}

/// 시퀀스 한 단계
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceSpec {
    pub condition: ConditionSpec,
    pub action: ActionSpec,
    pub register: Option<RegisterSpec>,
}

/// 조건
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionSpec {
    /// 쿼리 템플릿 (JSON 필터 문서)
    pub query: String,
    /// 스토리지 URI (템플릿 가능). 비어 있으면 설계 문서의 `storage`를 사용합니다.
    pub storage: String,
    /// 대상 컬렉션
    pub col: String,
}

/// 액션
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionSpec {
    /// 비어 있으면 no-op
    pub name: String,
    pub args: Vec<String>,
    /// 대상 워커 (비어 있으면 전체)
    pub workers: Vec<String>,
    /// `kill` 액션이 전달할 에러 메시지
    pub error: Option<String>,
}

impl ActionSpec {
    pub fn is_noop(&self) -> bool {
        self.name.is_empty()
    }
}

/// 매칭된 레코드를 변수로 등록하는 방법
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterSpec {
    pub kind: String,
    /// `Register.<to>`에 기록됩니다.
    pub to: String,
}

/// 조건 쿼리 문자열을 필터 문서로 파싱합니다.
///
/// 플레이스홀더는 모두 `1`로 치환한 뒤 파싱하므로, 문법만 검증합니다.
pub fn parse_condition_query(query: &str) -> Result<Map<String, Value>, QueryError> {
    if query.trim().is_empty() {
        return Err(QueryError::Empty);
    }
    let text = if template::is_templated(query) {
        template::stub_placeholders(query)
    } else {
        query.to_owned()
    };
    parse_filter(&text)
}

/// 확장이 끝난 쿼리 문자열을 필터 문서로 파싱합니다.
pub fn parse_filter(text: &str) -> Result<Map<String, Value>, QueryError> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(QueryError::Malformed {
            query: text.to_owned(),
            reason: format!("filter must be an object, got {}", json_kind(&other)),
        }),
        Err(e) => Err(QueryError::Malformed {
            query: text.to_owned(),
            reason: e.to_string(),
        }),
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// --- YAML 원본 형태 ---

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDesign {
    #[serde(default)]
    storage: Option<String>,
    #[serde(default)]
    hosts: Vec<RawHost>,
    #[serde(default, rename = "worker-config", alias = "node-config")]
    worker_config: BTreeMap<String, serde_yaml::Value>,
    #[serde(default)]
    sequences: Vec<RawSequence>,
    #[serde(default, rename = "exit-on-error")]
    exit_on_error: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawHost {
    #[serde(default)]
    weight: u32,
    #[serde(default)]
    local: bool,
    #[serde(default)]
    host: String,
    #[serde(default)]
    ssh: Option<SshCredentials>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSequence {
    condition: RawCondition,
    #[serde(default)]
    action: Option<RawAction>,
    #[serde(default)]
    register: Option<RawRegister>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawCondition {
    Query(String),
    Full {
        query: String,
        #[serde(default)]
        storage: String,
        #[serde(default)]
        col: String,
    },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawAction {
    #[serde(default)]
    name: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default, alias = "nodes")]
    workers: Vec<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRegister {
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default)]
    to: String,
}

impl RawDesign {
    fn into_design(self) -> Result<Design, ConfigError> {
        let storage = match self.storage.as_deref().map(str::trim) {
            None | Some("") => StorageUri::parse(DEFAULT_STORAGE_URI),
            Some(uri) => StorageUri::parse(uri),
        }
        .map_err(|e| ConfigError::invalid("storage", e.to_string()))?;

        let hosts = if self.hosts.is_empty() {
            vec![DesignHost::local_default()]
        } else {
            self.hosts
                .into_iter()
                .enumerate()
                .map(|(i, h)| h.into_host(i))
                .collect::<Result<Vec<_>, _>>()?
        };
        if hosts.iter().all(|h| h.weight == 0) {
            return Err(ConfigError::invalid(
                "hosts",
                "at least one host must have a weight greater than 0",
            ));
        }

        let mut common_config = String::new();
        let mut worker_config = BTreeMap::new();
        for (alias, fragment) in self.worker_config {
            let field = format!("worker-config.{alias}");
            let text = match fragment {
                serde_yaml::Value::Null => String::new(),
                serde_yaml::Value::String(s) => s,
                _ => {
                    return Err(ConfigError::invalid(
                        field,
                        "worker config should be a string",
                    ));
                }
            };
            if alias == COMMON_CONFIG_KEY {
                common_config = text;
                continue;
            }
            if alias.trim().is_empty() {
                return Err(ConfigError::invalid(field, "empty worker alias"));
            }
            if alias == SYSTEM_ALIAS {
                return Err(ConfigError::invalid(
                    field,
                    format!("'{SYSTEM_ALIAS}' is reserved for runner entries"),
                ));
            }
            // alias는 로그 디렉토리 안의 파일 이름이 됩니다
            if alias.contains(['/', '\\']) || alias.contains("..") {
                return Err(ConfigError::invalid(
                    field,
                    "worker alias must not contain path separators or '..'",
                ));
            }
            worker_config.insert(alias, text);
        }

        if self.sequences.is_empty() {
            return Err(ConfigError::invalid(
                "sequences",
                "a scenario needs at least one sequence",
            ));
        }
        let sequences = self
            .sequences
            .into_iter()
            .enumerate()
            .map(|(i, s)| s.into_spec(i))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Design {
            storage,
            hosts,
            worker_config,
            common_config,
            sequences,
            exit_on_error: self.exit_on_error.unwrap_or(true),
        })
    }
}

impl RawHost {
    fn into_host(self, index: usize) -> Result<DesignHost, ConfigError> {
        let field = |name: &str| format!("hosts[{index}].{name}");
        let mut host = self.host.trim().to_owned();
        let ssh = self.ssh.map(|s| SshCredentials {
            host: s.host.trim().to_owned(),
            user: s.user.trim().to_owned(),
            key: s.key.trim().to_owned(),
        });

        if !self.local {
            let Some(creds) = ssh.as_ref() else {
                return Err(ConfigError::invalid(field("ssh"), "missing credentials for remote host"));
            };
            if creds.host.is_empty() {
                return Err(ConfigError::invalid(field("ssh.host"), "empty host for remote"));
            }
            if creds.user.is_empty() {
                return Err(ConfigError::invalid(field("ssh.user"), "empty user for remote"));
            }
            if host.is_empty() {
                host = strip_port(&creds.host)
                    .ok_or_else(|| ConfigError::invalid(field("ssh.host"), "bad host:port"))?
                    .to_owned();
            }
            if host.is_empty() {
                return Err(ConfigError::invalid(field("host"), "host is missing"));
            }
        } else if host.is_empty() {
            host = "localhost".to_owned();
        }

        Ok(DesignHost {
            weight: self.weight,
            local: self.local,
            host,
            ssh,
        })
    }
}

/// `host:port`에서 호스트 부분만 반환합니다. `[::1]:22` 형식도 처리합니다.
fn strip_port(addr: &str) -> Option<&str> {
    if let Some(rest) = addr.strip_prefix('[') {
        let end = rest.find(']')?;
        return Some(&rest[..end]);
    }
    match addr.rsplit_once(':') {
        Some((host, port)) => {
            port.parse::<u16>().ok()?;
            Some(host)
        }
        None => Some(addr),
    }
}

impl RawSequence {
    fn into_spec(self, index: usize) -> Result<SequenceSpec, ConfigError> {
        let field = |name: &str| format!("sequences[{index}].{name}");

        let (query, storage, col) = match self.condition {
            RawCondition::Query(q) => (q, String::new(), String::new()),
            RawCondition::Full {
                query,
                storage,
                col,
            } => (query, storage, col),
        };
        let query = query.trim().to_owned();
        parse_condition_query(&query)
            .map_err(|e| ConfigError::invalid(field("condition.query"), e.to_string()))?;

        let storage = storage.trim().to_owned();
        if !storage.is_empty() && !template::is_templated(&storage) {
            StorageUri::parse(&storage)
                .map_err(|e| ConfigError::invalid(field("condition.storage"), e.to_string()))?;
        }
        let col = match col.trim() {
            "" => DEFAULT_COLLECTION.to_owned(),
            c => c.to_owned(),
        };

        let action = match self.action {
            None => ActionSpec::default(),
            Some(raw) => {
                let name = raw.name.trim().to_owned();
                let args: Vec<String> = raw.args.iter().map(|a| a.trim().to_owned()).collect();
                if name.is_empty() && !args.is_empty() {
                    return Err(ConfigError::invalid(field("action.name"), "empty action name"));
                }
                ActionSpec {
                    name,
                    args,
                    workers: raw.workers.iter().map(|w| w.trim().to_owned()).collect(),
                    error: raw.error,
                }
            }
        };

        let register = match self.register {
            None => None,
            Some(raw) => {
                let kind = raw.kind.trim().to_owned();
                let to = raw.to.trim().to_owned();
                match (kind.is_empty(), to.is_empty()) {
                    (true, true) => None,
                    (false, false) => {
                        if kind != REGISTER_LAST_MATCH {
                            return Err(ConfigError::invalid(
                                field("register.type"),
                                format!("unknown register type, {kind:?}"),
                            ));
                        }
                        Some(RegisterSpec { kind, to })
                    }
                    _ => {
                        return Err(ConfigError::invalid(
                            field("register"),
                            "both type and to are required",
                        ));
                    }
                }
            }
        };

        Ok(SequenceSpec {
            condition: ConditionSpec {
                query,
                storage,
                col,
            },
            action,
            register,
        })
    }
}
