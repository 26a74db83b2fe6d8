//! 会话凭证存储
//!
//! 所有对会话键值区域的读写都经过 [`CredentialStore`]，
//! 登录、刷新、登出的生命周期规则只在这里实现。

use secrecy::{ExposeSecret, Secret};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
pub const USER_ID_KEY: &str = "user_id";
pub const USERNAME_KEY: &str = "username";
pub const IS_STAFF_KEY: &str = "is_staff";

/// 会话拥有的全部键，clear() 时一次性删除
pub const SESSION_KEYS: [&str; 5] = [
    ACCESS_TOKEN_KEY,
    REFRESH_TOKEN_KEY,
    USER_ID_KEY,
    USERNAME_KEY,
    IS_STAFF_KEY,
];

pub type StorageResult<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt session file {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// 会话键值存储后端
pub trait SessionStorage: Send + Sync {
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// 在同一次快照中读取多个键，结果与 `keys` 一一对应
    fn get_many(&self, keys: &[&str]) -> StorageResult<Vec<Option<String>>> {
        keys.iter().map(|key| self.get(key)).collect()
    }

    /// 原子地写入多个键
    fn set_many(&self, entries: &[(&str, &str)]) -> StorageResult<()>;

    /// 原子地删除多个键（不存在的键忽略）
    fn remove_many(&self, keys: &[&str]) -> StorageResult<()>;

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.set_many(&[(key, value)])
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.remove_many(&[key])
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// 内存存储（测试与临时会话）
#[derive(Default)]
pub struct MemoryStorage {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStorage for MemoryStorage {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(lock(&self.values).get(key).cloned())
    }

    fn get_many(&self, keys: &[&str]) -> StorageResult<Vec<Option<String>>> {
        let values = lock(&self.values);
        Ok(keys.iter().map(|key| values.get(*key).cloned()).collect())
    }

    fn set_many(&self, entries: &[(&str, &str)]) -> StorageResult<()> {
        let mut values = lock(&self.values);
        for (key, value) in entries {
            values.insert((*key).to_string(), (*value).to_string());
        }
        Ok(())
    }

    fn remove_many(&self, keys: &[&str]) -> StorageResult<()> {
        let mut values = lock(&self.values);
        for key in keys {
            values.remove(*key);
        }
        Ok(())
    }
}

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// 文件存储
///
/// 会话以 JSON 对象保存在单个文件中，每次读取都从磁盘加载。
/// 写入先落到本次写入独占的临时文件再 rename，读者要么看到旧内容，
/// 要么看到新内容。
///
/// 写锁只在进程内生效：多个进程同时写同一文件时后写者覆盖先写者。
/// 所有操作都是同步文件 I/O，会在调用线程上短暂阻塞，
/// 只适合会话这种几百字节的小文件。
pub struct FileStorage {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn load(&self) -> StorageResult<BTreeMap<String, String>> {
        match std::fs::read(&self.path) {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(BTreeMap::new()),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| StorageError::Corrupt {
                path: self.path.clone(),
                source,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn persist(&self, values: &BTreeMap<String, String>) -> StorageResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        let bytes = serde_json::to_vec_pretty(values).map_err(|source| StorageError::Corrupt {
            path: self.path.clone(),
            source,
        })?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(format!(
            ".{}.{}.tmp",
            std::process::id(),
            TMP_SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        let tmp = PathBuf::from(tmp);

        std::fs::write(&tmp, bytes).map_err(|e| self.io_error(e))?;

        // 会话文件包含令牌，仅所有者可读写
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))
                .map_err(|e| self.io_error(e))?;
        }

        std::fs::rename(&tmp, &self.path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp);
            self.io_error(e)
        })
    }

    fn update<F>(&self, apply: F) -> StorageResult<()>
    where
        F: FnOnce(&mut BTreeMap<String, String>),
    {
        let _guard = lock(&self.write_lock);
        let mut values = self.load()?;
        apply(&mut values);
        self.persist(&values)
    }
}

impl SessionStorage for FileStorage {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.load()?.remove(key))
    }

    fn get_many(&self, keys: &[&str]) -> StorageResult<Vec<Option<String>>> {
        let mut values = self.load()?;
        Ok(keys.iter().map(|key| values.remove(*key)).collect())
    }

    fn set_many(&self, entries: &[(&str, &str)]) -> StorageResult<()> {
        self.update(|values| {
            for (key, value) in entries {
                values.insert((*key).to_string(), (*value).to_string());
            }
        })
    }

    fn remove_many(&self, keys: &[&str]) -> StorageResult<()> {
        self.update(|values| {
            for key in keys {
                values.remove(*key);
            }
        })
    }
}

/// 访问令牌 + 刷新令牌
///
/// 两者总是一起设置（登录、刷新成功），一起清除。
#[derive(Debug)]
pub struct CredentialPair {
    pub access: Secret<String>,
    pub refresh: Secret<String>,
}

impl CredentialPair {
    pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self {
            access: Secret::new(access.into()),
            refresh: Secret::new(refresh.into()),
        }
    }
}

impl Clone for CredentialPair {
    fn clone(&self) -> Self {
        Self::new(
            self.access.expose_secret().as_str(),
            self.refresh.expose_secret().as_str(),
        )
    }
}

/// 登录时缓存的身份信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    pub user_id: String,
    pub username: String,
    pub is_staff: bool,
}

/// 凭证存储
pub struct CredentialStore {
    storage: Arc<dyn SessionStorage>,
    // 串行化“读-判断-写”复合操作
    write_lock: Mutex<()>,
}

impl CredentialStore {
    pub fn new(storage: Arc<dyn SessionStorage>) -> Self {
        Self {
            storage,
            write_lock: Mutex::new(()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(FileStorage::new(path)))
    }

    /// 读取完整凭证对；只有访问令牌和刷新令牌都存在时才返回
    pub fn get(&self) -> StorageResult<Option<CredentialPair>> {
        let mut values = self
            .storage
            .get_many(&[ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY])?
            .into_iter();
        Ok(match (values.next().flatten(), values.next().flatten()) {
            (Some(access), Some(refresh)) => Some(CredentialPair::new(access, refresh)),
            _ => None,
        })
    }

    pub fn access_token(&self) -> StorageResult<Option<Secret<String>>> {
        Ok(self.storage.get(ACCESS_TOKEN_KEY)?.map(Secret::new))
    }

    pub fn refresh_token(&self) -> StorageResult<Option<Secret<String>>> {
        Ok(self.storage.get(REFRESH_TOKEN_KEY)?.map(Secret::new))
    }

    pub fn has_refresh_token(&self) -> StorageResult<bool> {
        Ok(self.storage.get(REFRESH_TOKEN_KEY)?.is_some())
    }

    pub fn set(&self, pair: &CredentialPair) -> StorageResult<()> {
        let _guard = lock(&self.write_lock);
        self.storage.set_many(&[
            (ACCESS_TOKEN_KEY, pair.access.expose_secret().as_str()),
            (REFRESH_TOKEN_KEY, pair.refresh.expose_secret().as_str()),
        ])
    }

    /// 刷新成功后更新访问令牌，后端轮换了刷新令牌时一并替换。
    ///
    /// `presented` 是提交给刷新端点的刷新令牌。存储中的刷新令牌已不是它
    /// （会话被清除，或已换成另一次登录）时不写入，返回 `false`。
    pub fn update_access(
        &self,
        presented: &Secret<String>,
        access: &Secret<String>,
        rotated_refresh: Option<&Secret<String>>,
    ) -> StorageResult<bool> {
        let _guard = lock(&self.write_lock);
        match self.storage.get(REFRESH_TOKEN_KEY)? {
            Some(stored) if stored == *presented.expose_secret() => {}
            _ => return Ok(false),
        }

        match rotated_refresh {
            Some(refresh) => self.storage.set_many(&[
                (ACCESS_TOKEN_KEY, access.expose_secret().as_str()),
                (REFRESH_TOKEN_KEY, refresh.expose_secret().as_str()),
            ])?,
            None => self.storage.set(ACCESS_TOKEN_KEY, access.expose_secret())?,
        }
        Ok(true)
    }

    pub fn set_identity(&self, identity: &SessionIdentity) -> StorageResult<()> {
        let _guard = lock(&self.write_lock);
        let is_staff = identity.is_staff.to_string();
        self.storage.set_many(&[
            (USER_ID_KEY, identity.user_id.as_str()),
            (USERNAME_KEY, identity.username.as_str()),
            (IS_STAFF_KEY, is_staff.as_str()),
        ])
    }

    pub fn identity(&self) -> StorageResult<Option<SessionIdentity>> {
        let mut values = self
            .storage
            .get_many(&[USER_ID_KEY, USERNAME_KEY, IS_STAFF_KEY])?
            .into_iter();
        let Some(user_id) = values.next().flatten() else {
            return Ok(None);
        };
        let username = values.next().flatten().unwrap_or_default();
        let is_staff = values
            .next()
            .flatten()
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Ok(Some(SessionIdentity {
            user_id,
            username,
            is_staff,
        }))
    }

    /// 清除会话拥有的全部字段（令牌与身份信息）
    pub fn clear(&self) -> StorageResult<()> {
        let _guard = lock(&self.write_lock);
        self.storage.remove_many(&SESSION_KEYS)
    }
}
