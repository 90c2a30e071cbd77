use reqwest::Method;
use secrecy::SecretString;
use serde_json::Value;

use autoresponder_core::domain::PersonId;
use autoresponder_core::platform::PlatformError;

use crate::client::{endpoint_label, WebexClient};

impl WebexClient {
    /// First match of `GET people?email=`.
    pub async fn person_id_by_email(
        &self,
        token: &SecretString,
        email: &str,
    ) -> Result<PersonId, PlatformError> {
        let request = self.authorized(Method::GET, "people", token).query(&[("email", email)]);
        let body = self.execute_json("people", request).await?;

        body.get("items")
            .and_then(Value::as_array)
            .and_then(|items| items.first())
            .and_then(|person| person.get("id"))
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(PersonId::new)
            .ok_or_else(|| PlatformError::PersonNotFound(email.to_owned()))
    }

    pub async fn read_field(
        &self,
        token: &SecretString,
        resource_path: &str,
        field: Option<&str>,
    ) -> Result<Value, PlatformError> {
        let endpoint = endpoint_label(resource_path);
        let request = self.authorized(Method::GET, resource_path, token);
        let body = self.execute_json(endpoint, request).await?;

        let value = match field.filter(|name| !name.is_empty()) {
            Some(name) => body.get(name).cloned().unwrap_or(Value::Null),
            None => body,
        };

        if is_blank(&value) {
            return Err(PlatformError::MissingField {
                resource: endpoint.to_owned(),
                field: field.unwrap_or_default().to_owned(),
            });
        }
        Ok(value)
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use mockito::{Matcher, Server};
    use serde_json::json;

    use autoresponder_core::domain::PersonId;
    use autoresponder_core::platform::{text_field, PlatformError};

    use crate::client::tests::client_for;

    #[tokio::test]
    async fn person_lookup_returns_first_item() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/people")
            .match_header("authorization", "Bearer owner-access")
            .match_query(Matcher::UrlEncoded("email".into(), "primary@example.com".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"items": [{"id": "P-1"}, {"id": "P-2"}]}).to_string())
            .create_async()
            .await;
        let client = client_for(&server.url());

        let id = client
            .person_id_by_email(&"owner-access".to_owned().into(), "primary@example.com")
            .await
            .expect("lookup");

        assert_eq!(id, PersonId::new("P-1"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn person_lookup_with_no_items_is_not_found() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/people")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(json!({"items": []}).to_string())
            .create_async()
            .await;
        let client = client_for(&server.url());

        let error = client
            .person_id_by_email(&"t".to_owned().into(), "nobody@example.com")
            .await
            .expect_err("no match");

        assert_eq!(error, PlatformError::PersonNotFound("nobody@example.com".to_owned()));
    }

    #[tokio::test]
    async fn person_lookup_maps_bad_request_to_status_error() {
        let mut server = Server::new_async().await;
        server.mock("GET", "/people").match_query(Matcher::Any).with_status(400).create_async().await;
        let client = client_for(&server.url());

        let error = client
            .person_id_by_email(&"t".to_owned().into(), "not-an-email")
            .await
            .expect_err("rejected");

        assert_eq!(error, PlatformError::Status { endpoint: "people".to_owned(), status: 400 });
    }

    #[tokio::test]
    async fn field_read_returns_member_or_whole_body() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/rooms/ROOM-1")
            .with_status(200)
            .with_body(json!({"id": "ROOM-1", "title": "Launch Planning"}).to_string())
            .expect(2)
            .create_async()
            .await;
        let client = client_for(&server.url());
        let token = "t".to_owned().into();

        let title = text_field(&client, &token, "rooms/ROOM-1", "title").await.expect("title");
        let whole = client.read_field(&token, "rooms/ROOM-1", None).await.expect("body");

        assert_eq!(title, "Launch Planning");
        assert_eq!(whole["id"], "ROOM-1");
    }

    #[tokio::test]
    async fn absent_or_empty_field_is_missing() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/people/P-1")
            .with_status(200)
            .with_body(json!({"displayName": ""}).to_string())
            .expect(2)
            .create_async()
            .await;
        let client = client_for(&server.url());
        let token = "t".to_owned().into();

        for field in ["displayName", "nickName"] {
            let error =
                client.read_field(&token, "people/P-1", Some(field)).await.expect_err("missing");
            assert_eq!(
                error,
                PlatformError::MissingField {
                    resource: "people/P-1".to_owned(),
                    field: field.to_owned()
                }
            );
        }
    }
}
