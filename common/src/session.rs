use log::{info, warn};

use crate::{
    api::{ApiRequest, AUTHORIZATION_HEADER},
    error::{StorageError, Unauthorized},
};

pub const TOKEN_KEY: &str = "api_token";
pub const DEVICE_ID_KEY: &str = "device_id";

/// Persistent string store (NVS on the device, JSON files on the host).
/// Implementations are cheap handles; clones share the same backing store.
pub trait KeyValueStore {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn write(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Device identity plus bearer token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceSession {
    device_id: Option<u64>,
    token: Option<String>,
}

impl DeviceSession {
    pub fn load_from_storage<K: KeyValueStore>(store: &K) -> Result<Self, StorageError> {
        let token = store.read(TOKEN_KEY)?.filter(|token| !token.is_empty());
        let device_id = match store.read(DEVICE_ID_KEY)? {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(id) if id > 0 => Some(id),
                _ => {
                    warn!("ignoring stored device id `{raw}`");
                    None
                }
            },
            None => None,
        };

        let session = Self { device_id, token };
        if session.is_registered() {
            info!("loaded credentials for device {}", device_id.unwrap_or_default());
        }
        Ok(session)
    }

    /// Stores credentials, then adopts them. Memory is left untouched if the
    /// store rejects either write.
    pub fn persist<K: KeyValueStore>(
        &mut self,
        store: &K,
        device_id: u64,
        token: &str,
    ) -> Result<(), StorageError> {
        store.write(TOKEN_KEY, token)?;
        store.write(DEVICE_ID_KEY, &device_id.to_string())?;
        self.device_id = Some(device_id);
        self.token = Some(token.to_string());
        Ok(())
    }

    pub fn is_registered(&self) -> bool {
        matches!(self.device_id, Some(id) if id > 0)
            && self.token.as_deref().is_some_and(|token| !token.is_empty())
    }

    pub fn device_id(&self) -> Option<u64> {
        self.device_id
    }

    pub fn authorize(&self, request: ApiRequest) -> Result<ApiRequest, Unauthorized> {
        match self.token.as_deref() {
            Some(token) if !token.is_empty() => {
                Ok(request.with_header(AUTHORIZATION_HEADER, format!("Bearer {token}")))
            }
            _ => Err(Unauthorized),
        }
    }

    /// Forgets the identity in memory first so a storage failure still
    /// leaves the session unregistered.
    pub fn invalidate<K: KeyValueStore>(&mut self, store: &K) -> Result<(), StorageError> {
        self.device_id = None;
        self.token = None;
        store.remove(TOKEN_KEY)?;
        store.remove(DEVICE_ID_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MemoryStore;

    #[test]
    fn empty_store_loads_unregistered() {
        let session = DeviceSession::load_from_storage(&MemoryStore::default()).unwrap();

        assert!(!session.is_registered());
        assert_eq!(session.authorize(ApiRequest::get("/x")), Err(Unauthorized));
    }

    #[test]
    fn persisted_credentials_survive_reload() {
        let store = MemoryStore::default();
        let mut session = DeviceSession::default();

        session.persist(&store, 42, "1|abc").unwrap();
        let reloaded = DeviceSession::load_from_storage(&store).unwrap();

        assert!(reloaded.is_registered());
        assert_eq!(reloaded.device_id(), Some(42));
        assert_eq!(store.get(TOKEN_KEY).as_deref(), Some("1|abc"));
        assert_eq!(
            reloaded.authorize(ApiRequest::get("/x")).unwrap().header("Authorization"),
            Some("Bearer 1|abc")
        );
    }

    #[test]
    fn zero_or_garbage_device_id_is_not_registered() {
        let store = MemoryStore::default();
        store.write(TOKEN_KEY, "t").unwrap();

        store.write(DEVICE_ID_KEY, "0").unwrap();
        assert!(!DeviceSession::load_from_storage(&store).unwrap().is_registered());

        store.write(DEVICE_ID_KEY, "twelve").unwrap();
        assert!(!DeviceSession::load_from_storage(&store).unwrap().is_registered());
    }

    #[test]
    fn token_without_id_still_authorizes_but_is_not_registered() {
        let store = MemoryStore::default();
        store.write(TOKEN_KEY, "t").unwrap();

        let session = DeviceSession::load_from_storage(&store).unwrap();

        assert!(!session.is_registered());
        assert!(session.authorize(ApiRequest::get("/x")).is_ok());
    }

    #[test]
    fn invalidate_clears_memory_and_storage() {
        let store = MemoryStore::default();
        let mut session = DeviceSession::default();
        session.persist(&store, 3, "tok").unwrap();

        session.invalidate(&store).unwrap();

        assert!(!session.is_registered());
        assert_eq!(store.get(TOKEN_KEY), None);
        assert_eq!(store.get(DEVICE_ID_KEY), None);
    }

    #[test]
    fn failed_persist_keeps_previous_identity() {
        let store = MemoryStore::default();
        let mut session = DeviceSession::default();
        store.fail_writes(true);

        assert!(session.persist(&store, 9, "tok").is_err());
        assert!(!session.is_registered());
    }
}
