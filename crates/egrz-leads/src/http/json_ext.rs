use super::HttpClientError;
use crate::prelude::*;
use crate::Result;
use async_trait::async_trait;
use easy_ext::ext;
use reqwest_middleware::RequestBuilder;
use serde::{de::DeserializeOwned, Serialize};

/// Upper bound of the response body echoed to the logs on a shape mismatch
const MAX_LOGGED_BODY_CHARS: usize = 2000;

#[ext(RequestBuilderJsonExt)]
#[async_trait]
pub(crate) impl RequestBuilder {
    /// Sends `req` as the JSON body and decodes the JSON response
    async fn send_and_read_json<Req: Serialize + Send + Sync, Res: DeserializeOwned>(
        self,
        req: Req,
    ) -> Result<Res, HttpClientError> {
        let bytes = self.json(&req).read_bytes().await?;

        serde_json::from_slice(&bytes).map_err(|source| {
            let body = String::from_utf8_lossy(&bytes);
            warn!(
                err = tracing_err(&source),
                response_body = %body.truncate_chars(MAX_LOGGED_BODY_CHARS),
                "Unexpected JSON response shape"
            );
            HttpClientError::UnexpectedResponseJsonShape { source }
        })
    }
}
