//! Provider-scoped security calls: user info and S2S key management.

use std::sync::Arc;

use papiea_client::ApiInstance;
use papiea_domain::error::{Error, Result};
use papiea_domain::model::{NewS2SKey, S2SKey, UserInfo};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;

/// Calls under `{engine}/provider/{prefix}/{version}` on behalf of the
/// holder of `key`. Every failure is wrapped in [`Error::Security`].
#[derive(Debug, Clone)]
pub struct SecurityApi {
    provider_api: Arc<ApiInstance>,
    prefix: String,
    version: String,
    key: String,
}

impl SecurityApi {
    pub(crate) fn new(provider_api: Arc<ApiInstance>, prefix: &str, version: &str, key: &str) -> Self {
        Self {
            provider_api,
            prefix: prefix.to_owned(),
            version: version.to_owned(),
            key: key.to_owned(),
        }
    }

    /// Identity behind the key.
    pub async fn user_info(&self) -> Result<UserInfo> {
        let info: Option<UserInfo> = self
            .request::<(), _>(Method::GET, "auth/user_info", None)
            .await
            .map_err(wrap("Cannot get user info"))?;
        Ok(info.unwrap_or_default())
    }

    pub async fn list_keys(&self) -> Result<Vec<S2SKey>> {
        let keys: Option<Vec<S2SKey>> = self
            .request::<(), _>(Method::GET, "s2skey", None)
            .await
            .map_err(wrap("Cannot list s2s keys"))?;
        Ok(keys.unwrap_or_default())
    }

    pub async fn create_key(&self, new_key: &NewS2SKey) -> Result<S2SKey> {
        let key: Option<S2SKey> = self
            .request(Method::POST, "s2skey", Some(new_key))
            .await
            .map_err(wrap("Cannot create s2s key"))?;
        key.ok_or_else(|| {
            wrap("Cannot create s2s key")(Error::Decode("empty response to create key".into()))
        })
    }

    pub async fn deactivate_key(&self, uuid: &str) -> Result<()> {
        let body = json!({ "uuid": uuid, "active": false });
        self.request::<_, serde_json::Value>(Method::PUT, "s2skey", Some(&body))
            .await
            .map_err(wrap("Cannot deactivate s2s key"))?;
        Ok(())
    }

    async fn request<B, T>(&self, method: Method, route: &str, body: Option<&B>) -> Result<Option<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.key))
            .map_err(|e| Error::Config(format!("invalid s2s key: {e}")))?;
        headers.insert(AUTHORIZATION, bearer);

        let path = format!("{}/{}/{route}", self.prefix, self.version);
        self.provider_api
            .call(method, &path, body, Some(&headers))
            .await
    }
}

fn wrap(context: &'static str) -> impl Fn(Error) -> Error {
    move |source| Error::Security {
        context: context.to_owned(),
        source: Box::new(source),
    }
}
