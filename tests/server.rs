use std::net::SocketAddr;

use http::StatusCode;
use neve_web::middleware::recovery::Recovery;
use neve_web::{ApiResult, Context, Router, Server};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

fn app() -> Router {
    Router::new()
        .get("/raw-panic", |_: &mut Context| boom())
        .layer(Recovery::new())
        .get("/panic", |_: &mut Context| boom())
        .get("/ok", |ctx: &mut Context| ctx.json(StatusCode::OK, &ApiResult::ok("fine")))
        .post("/echo", |ctx: &mut Context| {
            let body = ctx.request_mut().read_body().unwrap_or_default();
            ctx.data(StatusCode::OK, neve_web::ContentType::Text, &body);
        })
}

fn boom() {
    panic!("boom");
}

type Running = (SocketAddr, oneshot::Sender<()>, JoinHandle<Result<(), neve_web::Error>>);

async fn start(router: Router) -> Running {
    start_with(router, |server| server).await
}

async fn start_with(router: Router, configure: impl FnOnce(Server) -> Server) -> Running {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel::<()>();
    let server = configure(Server::from_listener(listener));
    let server = tokio::spawn(server.serve_with_shutdown(router, async move {
        let _ = rx.await;
    }));
    (addr, tx, server)
}

/// Sends one HTTP/1.1 request on a fresh connection, returns status and body.
async fn send(addr: SocketAddr, method: &str, path: &str, body: &str) -> (u16, String) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "{method} {path} HTTP/1.1\r\nhost: localhost\r\nconnection: close\r\ncontent-length: {}\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.unwrap();
    let raw = String::from_utf8(raw).unwrap();

    let status = raw.split_whitespace().nth(1).unwrap().parse().unwrap();
    let body = raw.split_once("\r\n\r\n").map(|(_, b)| b.to_owned()).unwrap_or_default();
    (status, body)
}

#[tokio::test(flavor = "multi_thread")]
async fn panic_is_a_500_and_the_server_keeps_serving() {
    let (addr, shutdown, server) = start(app()).await;

    let (status, body) = send(addr, "GET", "/panic", "").await;
    assert_eq!(status, 500);
    assert_eq!(body, r#"{"code":-1,"message":"internal error"}"#);

    let (status, body) = send(addr, "GET", "/ok", "").await;
    assert_eq!(status, 200);
    assert_eq!(body, r#"{"code":0,"message":"ok","data":"fine"}"#);

    shutdown.send(()).unwrap();
    server.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn unrecovered_panic_still_gets_a_response() {
    let (addr, shutdown, server) = start(app()).await;

    let (status, body) = send(addr, "GET", "/raw-panic", "").await;
    assert_eq!(status, 500);
    assert!(body.is_empty());

    let (status, _) = send(addr, "GET", "/ok", "").await;
    assert_eq!(status, 200);

    shutdown.send(()).unwrap();
    server.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn bodies_reach_handlers() {
    let (addr, shutdown, server) = start(app()).await;

    let (status, body) = send(addr, "POST", "/echo", "hello neve").await;
    assert_eq!(status, 200);
    assert_eq!(body, "hello neve");

    let (status, _) = send(addr, "GET", "/missing", "").await;
    assert_eq!(status, 404);

    shutdown.send(()).unwrap();
    server.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn oversized_bodies_are_rejected() {
    let (addr, shutdown, server) = start_with(app(), |server| server.max_body_size(8)).await;

    let (status, body) = send(addr, "POST", "/echo", "fits").await;
    assert_eq!(status, 200);
    assert_eq!(body, "fits");

    let (status, _) = send(addr, "POST", "/echo", "this body is longer than eight bytes").await;
    assert_eq!(status, 413);

    let (status, _) = send(addr, "GET", "/ok", "").await;
    assert_eq!(status, 200);

    shutdown.send(()).unwrap();
    server.await.unwrap().unwrap();
}
