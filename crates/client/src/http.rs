use std::time::Duration;

use async_trait::async_trait;
use helixbook_core::config::ApiConfig;
use helixbook_core::domain::booking::{BookingId, BookingRecord};
use helixbook_core::domain::feedback::{Feedback, FeedbackId, UserId};
use helixbook_core::domain::payment::{OrderCode, PaymentKind};
use helixbook_core::domain::sample::{KitId, Sample, TestKit};
use helixbook_core::errors::{RemoteError, RemoteErrorKind};
use helixbook_core::ports::{
    Acknowledgement, BookingService, CheckoutSession, FeedbackService, PaymentGateway,
    PaymentStatus, ReconcileRequest, ReconcileResponse, SampleService,
};
use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::envelope::{decode, decode_value, id_string};

#[derive(Clone, Debug)]
pub struct ClientSettings {
    pub base_url: String,
    pub timeout: Duration,
    pub auth_token: Option<SecretString>,
}

impl ClientSettings {
    pub fn from_config(api: &ApiConfig) -> Self {
        Self {
            base_url: api.base_url.clone(),
            timeout: Duration::from_secs(api.timeout_secs),
            auth_token: api.auth_token.clone(),
        }
    }
}

/// Talks to the booking backend over HTTP and implements every remote port.
pub struct HttpPortalClient {
    client: Client,
    base_url: Url,
    auth_token: Option<SecretString>,
}

impl HttpPortalClient {
    pub fn new(settings: ClientSettings) -> Result<Self, RemoteError> {
        let base_url = Url::parse(settings.base_url.trim()).map_err(|error| {
            RemoteError::new(
                RemoteErrorKind::Rejected,
                format!("invalid base url `{}`: {error}", settings.base_url),
            )
        })?;
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|error| RemoteError::network(error.to_string()))?;
        Ok(Self { client, base_url, auth_token: settings.auth_token })
    }

    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, RemoteError> {
        endpoint(&self.base_url, segments)
    }

    fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder, RemoteError> {
        let url = self.endpoint(segments)?;
        let builder = self.client.request(method, url);
        Ok(match &self.auth_token {
            Some(token) if !token.expose_secret().trim().is_empty() => {
                builder.bearer_auth(token.expose_secret())
            }
            _ => builder,
        })
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Vec<u8>, RemoteError> {
        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status();
        let path = response.url().path().to_string();
        let body = response.bytes().await.map_err(transport_error)?;
        if !status.is_success() {
            let error = status_error(status, &body);
            warn!(
                event_name = "client.request.failed",
                path = %path,
                status = %status,
                kind = error.kind.as_str(),
                "backend request failed"
            );
            return Err(error);
        }
        Ok(body.to_vec())
    }

    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<T, RemoteError> {
        let body = self.send(builder).await?;
        decode(&body)
    }

    /// A 2xx answer with no `success` field counts as accepted.
    async fn send_ack(&self, builder: RequestBuilder) -> Result<Acknowledgement, RemoteError> {
        let body = self.send(builder).await?;
        acknowledgement(&body)
    }
}

pub fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, RemoteError> {
    let mut url = base.clone();
    {
        let mut path = url.path_segments_mut().map_err(|()| {
            RemoteError::new(RemoteErrorKind::Rejected, format!("base url `{base}` cannot be a base"))
        })?;
        path.pop_if_empty();
        path.extend(segments);
    }
    Ok(url)
}

fn transport_error(error: reqwest::Error) -> RemoteError {
    if error.is_timeout() {
        RemoteError::timeout(error.to_string())
    } else if error.is_decode() {
        RemoteError::new(RemoteErrorKind::Decode, error.to_string())
    } else {
        RemoteError::network(error.to_string())
    }
}

pub fn status_error(status: StatusCode, body: &[u8]) -> RemoteError {
    let detail = serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|value| value.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| String::from_utf8_lossy(body).chars().take(200).collect());
    RemoteError::new(RemoteErrorKind::from_http_status(status.as_u16()), format!("{status}: {detail}"))
}

pub fn acknowledgement(body: &[u8]) -> Result<Acknowledgement, RemoteError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Acknowledgement::ok());
    }
    let value: Value = decode(body)?;
    let success = value.get("success").and_then(Value::as_bool).unwrap_or(true);
    let message = value.get("message").and_then(Value::as_str).map(str::to_string);
    Ok(Acknowledgement { success, message })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckoutReply {
    #[serde(default)]
    order_code: Value,
    #[serde(default, alias = "checkoutUrl", alias = "paymentUrl")]
    redirect_url: Option<String>,
}

pub fn checkout_session(value: Value) -> Result<CheckoutSession, RemoteError> {
    let reply: CheckoutReply = decode_value(value)?;
    let order_code = id_string(&reply.order_code).ok_or_else(|| {
        RemoteError::new(RemoteErrorKind::Decode, "checkout reply has no order code")
    })?;
    let redirect_url = reply.redirect_url.filter(|url| !url.trim().is_empty()).ok_or_else(|| {
        RemoteError::new(RemoteErrorKind::Decode, "checkout reply has no redirect url")
    })?;
    Ok(CheckoutSession { order_code: OrderCode(order_code), redirect_url })
}

/// Missing fields fall back to the request: a bare 2xx means the status was accepted.
pub fn reconcile_response(value: &Value, request: &ReconcileRequest) -> ReconcileResponse {
    let success = value.get("success").and_then(Value::as_bool).unwrap_or(true);
    let status = value
        .get("status")
        .or_else(|| value.get("data").and_then(|data| data.get("status")))
        .and_then(Value::as_str)
        .map(PaymentStatus::from_gateway)
        .unwrap_or(request.status);
    ReconcileResponse { success, status }
}

#[async_trait]
impl BookingService for HttpPortalClient {
    async fn fetch_booking(&self, id: &BookingId) -> Result<BookingRecord, RemoteError> {
        let request = self.request(Method::GET, &["api", "bookings", &id.0])?;
        self.send_json(request).await
    }

    async fn update_status(&self, id: &BookingId, code: u8) -> Result<Acknowledgement, RemoteError> {
        let request = self
            .request(Method::PUT, &["api", "bookings", &id.0, "status"])?
            .json(&json!({ "status": code }));
        self.send_ack(request).await
    }

    async fn confirm_delivery(&self, id: &BookingId) -> Result<Acknowledgement, RemoteError> {
        let request = self.request(Method::POST, &["api", "bookings", &id.0, "confirm-delivery"])?;
        self.send_ack(request).await
    }

    async fn confirm_collection(
        &self,
        id: &BookingId,
        human_date_time: &str,
    ) -> Result<Acknowledgement, RemoteError> {
        let request = self
            .request(Method::POST, &["api", "bookings", &id.0, "confirm-collection"])?
            .json(&json!({ "collectionTime": human_date_time }));
        self.send_ack(request).await
    }
}

#[async_trait]
impl PaymentGateway for HttpPortalClient {
    async fn initiate_checkout(
        &self,
        booking_id: &BookingId,
        kind: PaymentKind,
    ) -> Result<CheckoutSession, RemoteError> {
        let request = self
            .request(Method::POST, &["api", "payments", "checkout"])?
            .json(&json!({ "bookingId": booking_id.0, "isRemainingPayment": kind.is_remainder() }));
        let value: Value = self.send_json(request).await?;
        checkout_session(value)
    }

    async fn reconcile_payment(
        &self,
        request: &ReconcileRequest,
    ) -> Result<ReconcileResponse, RemoteError> {
        let segments: &[&str] = match request.kind {
            PaymentKind::Deposit => &["api", "payments", "callback"],
            PaymentKind::Remainder => &["api", "payments", "remaining", "callback"],
        };
        let builder = self.request(Method::POST, segments)?.json(&json!({
            "orderCode": request.order_code.0,
            "status": request.status.as_str(),
            "bookingId": request.booking_id.0,
        }));
        debug!(
            event_name = "client.payment.callback",
            order_code = %request.order_code,
            kind = %request.kind,
            "posting payment callback"
        );
        let body = self.send(builder).await?;
        let value = if body.iter().all(u8::is_ascii_whitespace) {
            Value::Null
        } else {
            decode::<Value>(&body)?
        };
        Ok(reconcile_response(&value, request))
    }
}

#[async_trait]
impl SampleService for HttpPortalClient {
    async fn fetch_kit_for_booking(
        &self,
        booking_id: &BookingId,
    ) -> Result<Option<TestKit>, RemoteError> {
        let request = self.request(Method::GET, &["api", "kits", "by-booking", &booking_id.0])?;
        match self.send_json::<Option<TestKit>>(request).await {
            Ok(kit) => Ok(kit),
            Err(error) if error.kind == RemoteErrorKind::NotFound => Ok(None),
            Err(error) => Err(error),
        }
    }

    async fn fetch_samples_for_kit(&self, kit_id: &KitId) -> Result<Vec<Sample>, RemoteError> {
        let request = self.request(Method::GET, &["api", "kits", &kit_id.0, "samples"])?;
        self.send_json(request).await
    }
}

#[async_trait]
impl FeedbackService for HttpPortalClient {
    async fn fetch_user_feedbacks(&self, user: &UserId) -> Result<Vec<Feedback>, RemoteError> {
        let request = self.request(Method::GET, &["api", "feedbacks", "user", &user.0])?;
        match self.send_json::<Vec<Value>>(request).await {
            Ok(items) => Ok(feedback_records(user, items)),
            Err(error) if error.kind == RemoteErrorKind::NotFound => Ok(Vec::new()),
            Err(error) => Err(error),
        }
    }

    async fn fetch_feedback_detail(&self, id: &FeedbackId) -> Result<Feedback, RemoteError> {
        let request = self.request(Method::GET, &["api", "feedbacks", &id.0])?;
        self.send_json(request).await
    }
}

/// Decodes list items one by one; a malformed record is dropped, not fatal.
fn feedback_records(user: &UserId, items: Vec<Value>) -> Vec<Feedback> {
    items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| match serde_json::from_value::<Feedback>(item) {
            Ok(feedback) => Some(feedback),
            Err(error) => {
                warn!(
                    event_name = "feedback.integrity_violation",
                    user_id = %user,
                    index,
                    error = %error,
                    "dropping malformed feedback record"
                );
                None
            }
        })
        .collect()
}
