use minefield_common::models::{CreateResponse, GridSize};
use minefield_server::{build, config::ServerConfig, logic::Games};
use rocket::{
    http::{ContentType, Status},
    local::asynchronous::Client,
};

async fn client(config: ServerConfig) -> Client {
    Client::tracked(build(config).unwrap()).await.unwrap()
}

async fn create(client: &Client, body: &str) -> (Status, Option<CreateResponse>) {
    let response = client
        .post("/create")
        .header(ContentType::JSON)
        .body(body)
        .dispatch()
        .await;
    let status = response.status();
    (status, response.into_json::<CreateResponse>().await)
}

#[rocket::async_test]
async fn create_registers_a_game() {
    let client = client(ServerConfig::default()).await;

    let (status, body) = create(&client, "{}").await;

    assert_eq!(status, Status::Ok);
    let id = body.unwrap().id;
    assert_eq!(id.len(), 5);
    let games = client.rocket().state::<Games>().unwrap();
    assert!(games.contains_key(&id));
}

#[rocket::async_test]
async fn create_applies_difficulty() {
    let client = client(ServerConfig::default()).await;

    let (_, body) = create(&client, r#"{"difficulty":"expert"}"#).await;

    let id = body.unwrap().id;
    let games = client.rocket().state::<Games>().unwrap();
    let game = games.get(&id).unwrap().value().clone();
    let size = game
        .lock()
        .await
        .session()
        .with_engine(|engine| engine.grid().size())
        .await;
    assert_eq!(size, GridSize::new(45, 17));
}

#[rocket::async_test]
async fn create_is_rate_limited_per_client() {
    let client = client(ServerConfig {
        games_per_minute: 2,
        ..Default::default()
    })
    .await;

    assert_eq!(create(&client, "{}").await.0, Status::Ok);
    assert_eq!(create(&client, "{}").await.0, Status::Ok);
    assert_eq!(create(&client, "{}").await.0, Status::TooManyRequests);

    let other = client
        .post("/create")
        .header(ContentType::JSON)
        .header(rocket::http::Header::new("X-Forwarded-For", "10.1.2.3"))
        .body("{}")
        .dispatch()
        .await;
    assert_eq!(other.status(), Status::Ok);
}

#[rocket::async_test]
async fn malformed_options_are_rejected() {
    let client = client(ServerConfig::default()).await;

    let (status, _) = create(&client, r#"{"difficulty":"impossible"}"#).await;

    assert_eq!(status, Status::UnprocessableEntity);
}
