use serde::Serialize;

/// Success envelope shared by every endpoint:
/// `{ "status": "success", "results"?, "token"?, "data": ... }`.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub data: T,
}

impl<T: Serialize> Envelope<T> {
    pub fn success(data: T) -> Self {
        Self {
            status: "success",
            results: None,
            token: None,
            message: None,
            data,
        }
    }

    pub fn with_results(mut self, n: usize) -> Self {
        self.results = Some(n);
        self
    }

    pub fn with_token(mut self, token: String) -> Self {
        self.token = Some(token);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn optional_fields_are_omitted() {
        let v = serde_json::to_value(Envelope::success(json!({ "a": 1 }))).unwrap();
        assert_eq!(v, json!({ "status": "success", "data": { "a": 1 } }));
    }

    #[test]
    fn list_envelope_carries_results() {
        let v = serde_json::to_value(Envelope::success(json!({ "places": [1, 2] })).with_results(2))
            .unwrap();
        assert_eq!(v["results"], 2);
    }
}
