use pretty_assertions::assert_eq;
use serde::{Deserialize, Serialize};
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use listsync::auth::{AuthContext, Credentials, Token};
use listsync::envelope::Envelope;
use listsync::remote::{Config, HttpCollection, RemoteCollection};
use listsync::sync::{ListSync, Opts, Policy};
use listsync::testing::ScriptedPrompt;
use listsync::{ErrorKind, ItemId, Locator};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Car {
    brand: String,
    model: String,
}

fn car(brand: &str, model: &str) -> Car {
    Car {
        brand: brand.to_string(),
        model: model.to_string(),
    }
}

fn base(server: &MockServer) -> Url {
    Url::parse(&format!("{}/api", server.uri())).unwrap()
}

fn hal_car(server: &MockServer, id: u64, brand: &str, model: &str) -> serde_json::Value {
    let href = format!("{}/api/cars/{id}", server.uri());
    json!({
        "brand": brand,
        "model": model,
        "_links": {
            "self": { "href": href },
            "car": { "href": href },
        }
    })
}

#[tokio::test]
async fn test_list_plain_array() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/todos"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": 1, "brand": "Ford", "model": "Mustang" },
            { "id": "b7", "brand": "Nissan", "model": "Leaf" },
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let remote: HttpCollection<Car> = HttpCollection::new(Config::new(base(&server), "todos"));
    let items = remote.list().await.unwrap();

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].id(), Some(&ItemId::from(1)));
    assert_eq!(items[1].id(), Some(&ItemId::from("b7")));
    assert_eq!(items[1].fields(), &car("Nissan", "Leaf"));
    assert_eq!(items[0].link(), None);
}

#[tokio::test]
async fn test_list_data_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/cars"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "id": 3, "brand": "Ford", "model": "Focus" }]
        })))
        .mount(&server)
        .await;

    let remote: HttpCollection<Car> =
        HttpCollection::new(Config::new(base(&server), "cars").envelope(Envelope::Data));
    let items = remote.list().await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].id(), Some(&ItemId::from(3)));
}

#[tokio::test]
async fn test_data_envelope_errors_are_application_failures() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/cars"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "error": "database unavailable" })),
        )
        .mount(&server)
        .await;

    let remote: HttpCollection<Car> =
        HttpCollection::new(Config::new(base(&server), "cars").envelope(Envelope::Data));
    let err = remote.list().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Envelope);
    assert!(err.is_application());
}

#[tokio::test]
async fn test_list_hal_collection() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/cars"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_embedded": {
                "cars": [
                    hal_car(&server, 1, "Ford", "Mustang"),
                    hal_car(&server, 2, "Nissan", "Leaf"),
                ]
            },
            "_links": { "self": { "href": format!("{}/api/cars", server.uri()) } }
        })))
        .mount(&server)
        .await;

    let remote: HttpCollection<Car> =
        HttpCollection::new(Config::new(base(&server), "cars").envelope(Envelope::Hal));
    let items = remote.list().await.unwrap();

    assert_eq!(items.len(), 2);
    assert_eq!(items[1].id(), Some(&ItemId::from(2)));
    assert_eq!(
        items[1].link().map(Url::as_str),
        Some(format!("{}/api/cars/2", server.uri()).as_str())
    );
    // the self link is preferred to address the item
    assert!(matches!(items[0].locator(), Some(Locator::Link(_))));
}

#[tokio::test]
async fn test_empty_hal_collection() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/cars"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_links": { "self": { "href": format!("{}/api/cars", server.uri()) } }
        })))
        .mount(&server)
        .await;

    let remote: HttpCollection<Car> =
        HttpCollection::new(Config::new(base(&server), "cars").envelope(Envelope::Hal));
    assert!(remote.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_create_returns_the_echo() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/cars"))
        .and(body_json(json!({ "brand": "Ford", "model": "Mustang" })))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(json!({ "id": 7, "brand": "Ford", "model": "Mustang" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let remote: HttpCollection<Car> = HttpCollection::new(Config::new(base(&server), "cars"));
    let echo = remote.create(&car("Ford", "Mustang")).await.unwrap().unwrap();
    assert_eq!(echo.id(), Some(&ItemId::from(7)));
}

#[tokio::test]
async fn test_no_content_is_an_empty_success() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/cars/7"))
        .and(body_json(json!({ "id": 7, "brand": "Ford", "model": "GT" })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/cars/7"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let remote: HttpCollection<Car> = HttpCollection::new(Config::new(base(&server), "cars"));
    let at = Locator::Id(ItemId::from(7));
    assert_eq!(remote.update(&at, &car("Ford", "GT")).await.unwrap(), None);
    remote.delete(&at).await.unwrap();
}

#[tokio::test]
async fn test_non_success_status_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/cars/9"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no car 9"))
        .mount(&server)
        .await;

    let remote: HttpCollection<Car> = HttpCollection::new(Config::new(base(&server), "cars"));
    let err = remote
        .delete(&Locator::Id(ItemId::from(9)))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Status);
    assert_eq!(err.status_code().map(|s| s.as_u16()), Some(404));
    assert!(err.to_string().contains("no car 9"));
}

#[tokio::test]
async fn test_unreachable_server_is_a_network_failure() {
    // nothing listens on a port that was just released
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let url = Url::parse(&format!("http://{}/api", listener.local_addr().unwrap())).unwrap();
    drop(listener);

    let remote: HttpCollection<Car> = HttpCollection::new(Config::new(url, "cars"));
    let err = remote.list().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Network);
    assert!(!err.is_application());
}

#[tokio::test]
async fn test_login_stores_the_authorization_header() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .and(body_json(json!({ "username": "user", "password": "user" })))
        .respond_with(ResponseTemplate::new(200).insert_header("Authorization", "Bearer xyz"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/cars"))
        .and(header("Authorization", "Bearer xyz"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let auth = AuthContext::new();
    let login = Url::parse(&format!("{}/login", server.uri())).unwrap();
    auth.login(&reqwest::Client::new(), login, &Credentials::new("user", "user"))
        .await
        .unwrap();
    assert!(auth.is_authenticated().await);

    let remote: HttpCollection<Car> =
        HttpCollection::new(Config::new(base(&server), "cars")).with_auth(auth);
    assert!(remote.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_rejected_login_keeps_the_previous_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let auth = AuthContext::with_token(Token::bearer("old"));
    let login = Url::parse(&format!("{}/login", server.uri())).unwrap();
    let err = auth
        .login(&reqwest::Client::new(), login, &Credentials::new("user", "wrong"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Status);
    assert!(auth.is_authenticated().await);
}

#[tokio::test]
async fn test_login_without_token_header() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let auth = AuthContext::new();
    let login = Url::parse(&format!("{}/login", server.uri())).unwrap();
    let err = auth
        .login(&reqwest::Client::new(), login, &Credentials::new("user", "user"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthenticated);
    assert!(!auth.is_authenticated().await);
}

#[tokio::test]
async fn test_list_sync_over_hal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/cars"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_embedded": {
                "cars": [
                    hal_car(&server, 1, "Ford", "Mustang"),
                    hal_car(&server, 2, "Nissan", "Leaf"),
                ]
            }
        })))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/cars/1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/cars"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_embedded": { "cars": [hal_car(&server, 2, "Nissan", "Leaf")] }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let remote: HttpCollection<Car> =
        HttpCollection::new(Config::new(base(&server), "cars").envelope(Envelope::Hal));
    let prompt = ScriptedPrompt::new();
    let sync = ListSync::new(remote)
        .with_prompt(prompt.clone())
        .with_opts(Opts::default().policy(Policy::Refetch).label("car"));
    sync.mount().await.unwrap();

    let key = sync.read(|s| s.key_of(&ItemId::from(1))).await.unwrap();
    assert!(sync.delete(key).await.unwrap());

    let items = sync.items().await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].fields(), &car("Nissan", "Leaf"));
    assert_eq!(prompt.notices(), vec!["Car deleted successfully"]);
}

#[tokio::test]
async fn test_text_bodies_on_success_are_not_failures() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/cars"))
        .respond_with(ResponseTemplate::new(201).set_body_string("created"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/cars/1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("deleted"))
        .expect(1)
        .mount(&server)
        .await;

    let remote: HttpCollection<Car> = HttpCollection::new(Config::new(base(&server), "cars"));
    assert_eq!(remote.create(&car("Ford", "Focus")).await.unwrap(), None);
    remote.delete(&Locator::Id(ItemId::from(1))).await.unwrap();
}

#[tokio::test]
async fn test_local_patch_delete_with_text_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/cars"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": 1, "brand": "Ford", "model": "Mustang" },
            { "id": 2, "brand": "Nissan", "model": "Leaf" },
        ])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/cars/1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("deleted"))
        .expect(1)
        .mount(&server)
        .await;

    let remote: HttpCollection<Car> = HttpCollection::new(Config::new(base(&server), "cars"));
    let prompt = ScriptedPrompt::new();
    let sync = ListSync::new(remote)
        .with_prompt(prompt.clone())
        .with_opts(Opts::default().policy(Policy::LocalPatch));
    sync.mount().await.unwrap();

    let key = sync.read(|s| s.key_of(&ItemId::from(1))).await.unwrap();
    assert!(sync.delete(key).await.unwrap());

    let items = sync.items().await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].id(), Some(&ItemId::from(2)));
    assert!(prompt.alerts().is_empty());
}
