use reqwest::Method;
use secrecy::SecretString;
use serde::Serialize;

use autoresponder_core::domain::PersonId;
use autoresponder_core::platform::PlatformError;

use crate::client::WebexClient;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DirectMessage<'a> {
    to_person_id: &'a str,
    markdown: String,
}

/// Settings forms submit line breaks as a literal backslash-n.
pub fn normalize_markdown(markdown: &str) -> String {
    markdown.replace("\\n", "\n")
}

impl WebexClient {
    pub async fn post_direct_message(
        &self,
        token: &SecretString,
        recipient: &PersonId,
        markdown: &str,
    ) -> Result<(), PlatformError> {
        let payload =
            DirectMessage { to_person_id: recipient.as_str(), markdown: normalize_markdown(markdown) };
        let request = self.authorized(Method::POST, "messages", token).json(&payload);
        self.execute("messages", request).await?;
        Ok(())
    }
}
