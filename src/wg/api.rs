//! Request targets for the WoT Blitz API endpoints.

use tracing::debug;

use crate::config::ApiConfig;
use crate::transport::Target;
use crate::wg::{Region, WgError};

const TANK_STATS: &str = "tanks/stats/";
const ACCOUNT_INFO: &str = "account/info/";
const ACCOUNT_ACHIEVEMENTS: &str = "account/achievements/";

/// Most account IDs the API accepts in one call.
pub const MAX_ACCOUNTS_PER_REQUEST: usize = 100;

/// Fields requested from `account/info/` when the caller names none.
pub const DEFAULT_ACCOUNT_FIELDS: &[&str] = &[
    "account_id",
    "created_at",
    "updated_at",
    "last_battle_time",
    "nickname",
];

/// Builds targets for the public API.
#[derive(Clone)]
pub struct WgApi {
    app_id: String,
    ru_app_id: String,
}

impl WgApi {
    pub fn new(app_id: impl Into<String>, ru_app_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            ru_app_id: ru_app_id.into(),
        }
    }

    pub fn from_config(config: &ApiConfig) -> Self {
        Self::new(config.app_id.clone(), config.ru_app_id.clone())
    }

    fn application_id(&self, region: Region) -> &str {
        match region {
            Region::Ru => &self.ru_app_id,
            _ => &self.app_id,
        }
    }

    fn endpoint(&self, region: Region, path: &str) -> Result<Target, WgError> {
        let server = region.base_url().ok_or(WgError::NoServer(region))?;
        let target = Target::parse(&format!("{}{}", server, path))
            .map_err(|e| WgError::InvalidUrl(e.to_string()))?;
        Ok(target.param("application_id", self.application_id(region)))
    }

    /// Per-tank stats of one account. The account must belong to `region`.
    pub fn tank_stats_target(
        &self,
        account_id: u64,
        region: Region,
        tank_ids: &[u32],
        fields: &[&str],
    ) -> Result<Target, WgError> {
        let actual = Region::from_account_id(account_id);
        if actual != region {
            return Err(WgError::RegionMismatch {
                account_id,
                expected: region,
                actual,
            });
        }

        let mut target = self
            .endpoint(region, TANK_STATS)?
            .param("account_id", account_id.to_string());
        if !tank_ids.is_empty() {
            target = target.param("tank_id", join(tank_ids));
        }
        if !fields.is_empty() {
            target = target.param("fields", fields.join(","));
        }
        debug!(account_id, region = %region, "Built tank stats target");
        Ok(target)
    }

    /// Account info for up to [`MAX_ACCOUNTS_PER_REQUEST`] accounts.
    /// An empty `fields` slice selects [`DEFAULT_ACCOUNT_FIELDS`].
    pub fn account_info_target(
        &self,
        account_ids: &[u64],
        region: Region,
        fields: &[&str],
    ) -> Result<Target, WgError> {
        let fields = if fields.is_empty() {
            DEFAULT_ACCOUNT_FIELDS
        } else {
            fields
        };
        self.accounts_target(ACCOUNT_INFO, account_ids, region, fields)
    }

    /// Achievements for up to [`MAX_ACCOUNTS_PER_REQUEST`] accounts.
    pub fn achievements_target(
        &self,
        account_ids: &[u64],
        region: Region,
        fields: &[&str],
    ) -> Result<Target, WgError> {
        self.accounts_target(ACCOUNT_ACHIEVEMENTS, account_ids, region, fields)
    }

    fn accounts_target(
        &self,
        path: &str,
        account_ids: &[u64],
        region: Region,
        fields: &[&str],
    ) -> Result<Target, WgError> {
        if account_ids.is_empty() {
            return Err(WgError::EmptyIds);
        }
        if account_ids.len() > MAX_ACCOUNTS_PER_REQUEST {
            return Err(WgError::TooManyIds(account_ids.len()));
        }
        let mut target = self
            .endpoint(region, path)?
            .param("account_id", join(account_ids));
        if !fields.is_empty() {
            target = target.param("fields", fields.join(","));
        }
        Ok(target)
    }
}

impl std::fmt::Debug for WgApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgApi")
            .field("app_id", &"***")
            .field("ru_app_id", &"***")
            .finish()
    }
}

fn join<T: ToString>(ids: &[T]) -> String {
    ids.iter().map(ToString::to_string).collect::<Vec<_>>().join(",")
}
