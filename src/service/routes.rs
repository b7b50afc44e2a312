//! Person service endpoints.
//!
//! | Method | Path | Notes |
//! |---|---|---|
//! | GET | `/` | welcome message |
//! | GET, HEAD | `/health` | empty 200, never logged |
//! | GET | `/persons` | cached list |
//! | GET | `/persons/{id}` | one person |
//! | POST, PUT, DELETE | `/persons` | basic auth, no-cache |

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderValue};
use http::{Method, StatusCode};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{error, info, warn};

use super::AppState;
use super::person::{ALL_FIELDS, BINDER, CREATE_COLUMNS, DELETE_COLUMNS, Person, UPDATE_COLUMNS};
use super::store::PersonFilter;
use crate::api_error::ApiError;
use crate::config::AppConfig;
use crate::encode::{Encoder, return_json_encode};
use crate::handler::Handler;
use crate::health;
use crate::middleware::{Stack, basic_auth, no_cache};
use crate::notify::Email;
use crate::request::Request;
use crate::response::{ContentType, IntoResponse, Response};
use crate::router::Router;
use crate::writer::ResponseWriter;

/// Cache dependency tag for every cached person read.
pub const PERSONS_TAG: &str = "persons";

const PERSONS_LIST_KEY: &str = "persons:list";
const SUPPORT_EMAIL: &str = "support@example.com";

/// Builds the service router from its configuration and shared state.
pub fn router(config: &AppConfig, state: Arc<AppState>) -> Router {
    let writes = Stack::new().with(no_cache).with(basic_auth(
        config.basic_auth.clone(),
        Value::from(config.unauthorized_error.clone()),
    ));

    Router::new()
        .cors(config.cors.clone())
        .skip_logging(config.skip_logging_paths.clone())
        .params_config(config.params.clone())
        .on(Method::GET, "/", index)
        .on_quiet(Method::GET, "/health", health::health)
        .on_quiet(Method::HEAD, "/health", health::health)
        .on(Method::GET, "/persons", with_state(&state, list_persons))
        .on(Method::GET, "/persons/{id}", with_state(&state, get_person))
        .on(Method::POST, "/persons", writes.wrap(with_state(&state, create_person)))
        .on(Method::PUT, "/persons", writes.wrap(with_state(&state, update_person)))
        .on(Method::DELETE, "/persons", writes.wrap(with_state(&state, delete_person)))
}

fn with_state<F, Fut>(state: &Arc<AppState>, handler: F) -> impl Handler
where
    F: Fn(Arc<AppState>, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    let state = Arc::clone(state);
    move |req: Request| handler(Arc::clone(&state), req)
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn fail(req: &Request, status: StatusCode, internal: impl Into<String>, public: &str, data: Value) -> Response {
    ApiError::from_request(req, internal, public, status.as_u16(), data).into_response()
}

fn encoded<T: Serialize + ?Sized>(req: &Request, status: StatusCode, value: &T) -> Response {
    match return_json_encode(status, value, &ALL_FIELDS) {
        Ok(res) => res,
        Err(e) => fail(req, StatusCode::INTERNAL_SERVER_ERROR, format!("encoding failed: {e}"), "unable to encode response", Value::Null),
    }
}

/// The `id` parameter, or the response to send when it is missing or bad.
fn required_id(req: &Request, action: &str) -> Result<u64, Response> {
    let (ok, missing) = req.params().has_all(&["id"]);
    if !ok {
        return Err(fail(
            req,
            StatusCode::BAD_REQUEST,
            format!("missing required fields: {missing:?}"),
            &format!("unable to {action} person: missing required field id"),
            json!({ "missing": missing }),
        ));
    }
    match req.params().get_u64("id") {
        Some(id) if id > 0 => Ok(id),
        _ => Err(fail(
            req,
            StatusCode::BAD_REQUEST,
            format!("invalid id: {:?}", req.params().get("id")),
            &format!("unable to {action} person: invalid id"),
            Value::Null,
        )),
    }
}

/// The stored person, or the response to send when it cannot be read.
fn load(state: &AppState, req: &Request, id: u64, action: &str) -> Result<Person, Response> {
    match state.store.find_by_id(id) {
        Ok(Some(person)) => Ok(person),
        Ok(None) => Err(fail(
            req,
            StatusCode::NOT_FOUND,
            format!("person not found: {id}"),
            "person not found",
            Value::Null,
        )),
        Err(e) => Err(fail(
            req,
            StatusCode::EXPECTATION_FAILED,
            format!("error getting related person: {e}"),
            &format!("unable to {action} person"),
            Value::Null,
        )),
    }
}

fn invalidate(state: &AppState) {
    if state.cache_enabled {
        state.cache.kill_by_dependency(&[PERSONS_TAG]);
    }
}

// ── Handlers ──────────────────────────────────────────────────────────────────

async fn index(_req: Request) -> Response {
    Response::respond(StatusCode::OK, &json!({ "message": "Welcome to the apiary API!" }))
}

async fn list_persons(state: Arc<AppState>, req: Request) -> Response {
    if state.cache_enabled {
        if let Some(body) = state.cache.get(PERSONS_LIST_KEY) {
            return Response::builder().header("x-cache", "hit").bytes(ContentType::Json, body);
        }
    }

    let persons = match state.store.find(&PersonFilter::default()) {
        Ok(persons) => persons,
        Err(e) => {
            return fail(&req, StatusCode::EXPECTATION_FAILED, format!("error listing persons: {e}"), "unable to list persons", Value::Null);
        }
    };

    let mut w = ResponseWriter::buffered(&req);
    w.set_header(CONTENT_TYPE, HeaderValue::from_static(ContentType::Json.as_str()));
    w.add_cache_identifier(PERSONS_TAG);
    w.set_cache_ttl(state.cache_ttl);

    if let Err(e) = Encoder::default().encode(&mut w, &persons, &ALL_FIELDS) {
        return fail(&req, StatusCode::INTERNAL_SERVER_ERROR, format!("encoding persons failed: {e}"), "unable to list persons", Value::Null);
    }

    if state.cache_enabled {
        let dependencies: Vec<&str> = w.cache_identifiers().iter().map(String::as_str).collect();
        state.cache.set(PERSONS_LIST_KEY, Bytes::copy_from_slice(w.buffer()), w.cache_ttl(), &dependencies);
    }
    w.commit();
    w.into_response()
}

async fn get_person(state: Arc<AppState>, req: Request) -> Response {
    let id = match required_id(&req, "find") {
        Ok(id) => id,
        Err(res) => return res,
    };
    match load(&state, &req, id, "find") {
        Ok(person) if person.is_deleted => fail(
            &req,
            StatusCode::NOT_FOUND,
            format!("person is marked as deleted: {id}"),
            "person not found",
            Value::Null,
        ),
        Ok(person) => encoded(&req, StatusCode::OK, &person),
        Err(res) => res,
    }
}

async fn create_person(state: Arc<AppState>, mut req: Request) -> Response {
    let (ok, missing) = req.params().has_all(&["email"]);
    if !ok {
        return fail(
            &req,
            StatusCode::BAD_REQUEST,
            format!("missing required fields: {missing:?}"),
            "unable to create person: missing required field email",
            json!({ "missing": missing }),
        );
    }

    req.params_mut().permit(&CREATE_COLUMNS);
    let mut person = Person::default();
    req.params().imbue(&mut person, &BINDER);

    if let Err(e) = person.validate() {
        return fail(&req, StatusCode::UNPROCESSABLE_ENTITY, format!("validation failed: {e}"), "unable to create person", e.to_json());
    }
    if let Err(e) = state.store.insert(&mut person, &CREATE_COLUMNS) {
        return fail(&req, StatusCode::EXPECTATION_FAILED, format!("error creating person: {e}"), "error in save method", Value::Null);
    }
    invalidate(&state);
    info!(id = person.id, "person created");

    send_welcome_email(&state, &person).await;
    encoded(&req, StatusCode::CREATED, &person)
}

async fn update_person(state: Arc<AppState>, mut req: Request) -> Response {
    let id = match required_id(&req, "update") {
        Ok(id) => id,
        Err(res) => return res,
    };
    let mut person = match load(&state, &req, id, "update") {
        Ok(person) => person,
        Err(res) => return res,
    };
    if person.is_deleted {
        return fail(&req, StatusCode::EXPECTATION_FAILED, format!("person is marked as deleted: {id}"), "unable to update a deleted record", Value::Null);
    }

    req.params_mut().permit(&UPDATE_COLUMNS);
    req.params().imbue(&mut person, &BINDER);

    if let Err(e) = person.validate() {
        return fail(&req, StatusCode::UNPROCESSABLE_ENTITY, format!("validation failed: {e}"), "unable to update person", e.to_json());
    }
    match state.store.update(&mut person, &UPDATE_COLUMNS) {
        Ok(0) => fail(&req, StatusCode::NOT_FOUND, format!("person vanished during update: {id}"), "person not found", Value::Null),
        Ok(affected) => {
            invalidate(&state);
            info!(id, affected, "person updated");
            encoded(&req, StatusCode::OK, &person)
        }
        Err(e) => fail(&req, StatusCode::EXPECTATION_FAILED, format!("error updating person: {e}"), "error in save method, updating person failed", Value::Null),
    }
}

async fn delete_person(state: Arc<AppState>, req: Request) -> Response {
    let id = match required_id(&req, "delete") {
        Ok(id) => id,
        Err(res) => return res,
    };
    let mut person = match load(&state, &req, id, "delete") {
        Ok(person) => person,
        Err(res) => return res,
    };
    if person.is_deleted {
        return encoded(&req, StatusCode::OK, &person);
    }

    person.is_deleted = true;
    match state.store.update(&mut person, &DELETE_COLUMNS) {
        Ok(0) => fail(&req, StatusCode::NOT_FOUND, format!("person vanished during delete: {id}"), "person not found", Value::Null),
        Ok(_) => {
            invalidate(&state);
            info!(id, "person deleted");
            encoded(&req, StatusCode::OK, &person)
        }
        Err(e) => fail(&req, StatusCode::EXPECTATION_FAILED, format!("error deleting person: {e}"), "error in save method, deleting person failed", Value::Null),
    }
}

/// Queues the welcome email. A closed queue only costs the email.
async fn send_welcome_email(state: &AppState, person: &Person) {
    let mut email = Email::from_config(&state.email);
    email.recipients.push(person.email.clone());
    email.subject = "Welcome aboard".to_owned();
    email.tags.push("welcome".to_owned());

    let data = person.email_data(SUPPORT_EMAIL);
    let template = state.welcome.clone();
    let mailer = Arc::clone(&state.mailer);

    let queued = state
        .queue
        .enqueue("welcome_email", async move {
            match template.render(&data) {
                Ok(body) => {
                    email.text_body = body;
                    if let Err(e) = mailer.send(&email) {
                        error!(to = ?email.recipients, "welcome email failed: {e}");
                    }
                }
                Err(e) => error!("welcome email template failed: {e}"),
            }
        })
        .await;
    if let Err(e) = queued {
        warn!(id = person.id, "welcome email dropped: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::tests::{request, state};

    #[tokio::test]
    async fn index_welcomes() {
        let res = index(request(Method::GET, "/", None)).await;
        assert_eq!(res.status_code(), StatusCode::OK);
        let body: Value = serde_json::from_slice(res.body()).expect("json");
        assert_eq!(body["message"], "Welcome to the apiary API!");
    }

    #[tokio::test]
    async fn list_is_cached_until_a_write() {
        let state = state();
        let mut ada = Person { email: "ada@example.com".into(), ..Person::default() };
        state.store.insert(&mut ada, &CREATE_COLUMNS).expect("insert");

        let first = list_persons(Arc::clone(&state), request(Method::GET, "/persons", None)).await;
        assert_eq!(first.header("x-cache"), None);
        assert!(state.cache.exists(PERSONS_LIST_KEY));

        let second = list_persons(Arc::clone(&state), request(Method::GET, "/persons", None)).await;
        assert_eq!(second.header("x-cache"), Some("hit"));
        assert_eq!(first.body(), second.body());

        invalidate(&state);
        assert!(!state.cache.exists(PERSONS_LIST_KEY));
    }
}
