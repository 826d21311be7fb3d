//! HTTP client against a one-shot in-process engine stub.
//!
//! Each stub accepts a single connection, records the raw request and answers
//! with a canned status/body, so the tests see exactly what goes on the wire.

use crate::client::{ApiErrorKind, ClientError, EarthOs, PointsQuery};
use crate::config::EngineConfig;
use crate::formula::Var;
use crate::raster::tests::encode_pfpng;
use crate::raster::ByteOrder;
use crate::Region;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

const API_KEY: &str = "test-key";

/// Serve one request, returning the base URL and a handle yielding the raw request.
async fn serve_once(status: u16, content_type: &'static str, body: Vec<u8>) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;

        let head = format!(
            "HTTP/1.1 {status} Stub\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        socket.write_all(head.as_bytes()).await.unwrap();
        socket.write_all(&body).await.unwrap();
        socket.shutdown().await.ok();
        request
    });

    (format!("http://{addr}"), handle)
}

/// Read headers plus a Content-Length body.
async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&buf);
        if let Some(end) = text.find("\r\n\r\n") {
            let length = text[..end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if buf.len() >= end + 4 + length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn client(host: &str) -> EarthOs {
    let config = EngineConfig {
        host: host.to_string(),
        api_key: Some(API_KEY.to_string()),
        timeout_secs: 5,
    };
    let http = reqwest::Client::builder().no_proxy().build().unwrap();
    EarthOs::with_http_client(config, http).unwrap()
}

fn request_line(request: &str) -> &str {
    request.lines().next().unwrap_or_default()
}

#[tokio::test]
async fn tile_request_sends_formula_and_decodes_pfpng() {
    let payload = encode_pfpng(&[1.0, 2.0, 3.0, 4.0], 2, 2, ByteOrder::Little);
    let (host, server) = serve_once(200, "image/png", payload).await;

    let now = Var::new("gfs", "air_temperature");
    let past = now.clone().offset([("time", -86400.0)]).unwrap();
    let raster = client(&host)
        .tile(0, 0, 0, 1719246600, now - past)
        .await
        .unwrap();

    assert_eq!(raster.resolution(), (2, 2));
    assert_eq!(raster.data(), &[1.0, 2.0, 3.0, 4.0]);
    assert!((raster.region().north - 85.0511).abs() < 1e-3);

    let request = server.await.unwrap();
    let line = request_line(&request);
    assert!(line.starts_with("GET /map/0/0/0/?"), "{line}");
    assert!(line.contains("timestamp=1719246600"), "{line}");
    assert!(line.contains("format=pfpng"), "{line}");
    // "(gfs.air_temperature - gfs.air_temperature[time: -86400])", form-encoded
    assert!(
        line.contains("formula=%28gfs.air_temperature+-+gfs.air_temperature%5Btime%3A+-86400%5D%29"),
        "{line}"
    );
    assert!(request
        .to_ascii_lowercase()
        .contains(&format!("authorization: bearer {}", API_KEY.to_ascii_lowercase())));
}

#[tokio::test]
async fn region_request_carries_bbox_and_size() {
    let payload = encode_pfpng(&[0.5; 6], 3, 2, ByteOrder::Little);
    let (host, server) = serve_once(200, "image/png", payload).await;

    let region = Region::new(70.0, 60.0, -10.0, -30.0);
    let raster = client(&host)
        .region(region, "2024-06-24T16:30:00Z", "gfs.air_temperature", 3, 2)
        .await
        .unwrap();
    assert_eq!(raster.resolution(), (3, 2));
    assert_eq!(raster.region(), region);

    let request = server.await.unwrap();
    let line = request_line(&request);
    assert!(line.starts_with("GET /map/?"), "{line}");
    for expected in ["width=3", "height=2", "north=70", "south=60", "east=-10", "west=-30", "timestamp=1719246600"] {
        assert!(line.contains(expected), "missing {expected} in {line}");
    }
}

#[tokio::test]
async fn point_request_parses_response() {
    let body = br#"{"result": 84.7, "spacetime": {"time": 1719246600, "latitude": 64.149141, "longitude": -21.940747}, "error": {"type": "NoError"}}"#;
    let (host, server) = serve_once(200, "application/json", body.to_vec()).await;

    let point = client(&host)
        .point(64.149141, -21.940747, 2.0, "2024-06-24T16:30:00Z", "gfs.relative_humidity")
        .await
        .unwrap();
    assert!(point.error.is_ok());
    assert_eq!(point.spacetime.time, Some(1719246600.0));
    assert!((point.result.unwrap() - 84.7).abs() < 0.1);

    let request = server.await.unwrap();
    let line = request_line(&request);
    assert!(line.starts_with("GET /point/?"), "{line}");
    assert!(line.contains("time=1719246600"), "{line}");
    assert!(line.contains("format=json"), "{line}");
}

#[tokio::test]
async fn points_request_posts_json_batch() {
    let (host, server) = serve_once(200, "application/json", b"[]".to_vec()).await;

    let query = PointsQuery::default()
        .formula("gfs.air_temperature")
        .timestamp(1679933282)
        .unwrap()
        .point("1", 66.0, 23.0);
    let response = client(&host).points(&query).await.unwrap();
    assert_eq!(response, serde_json::json!([]));

    let request = server.await.unwrap();
    assert!(request_line(&request).starts_with("POST /points/"));
    assert!(request.contains(r#""formula":"gfs.air_temperature""#));
    assert!(request.contains(r#""id":"1""#));
}

#[tokio::test]
async fn error_status_maps_to_api_error_with_body() {
    let (host, server) = serve_once(403, "text/plain", b"namespace not licensed".to_vec()).await;

    let err = client(&host)
        .tile(0, 0, 0, 0, "gfs.air_temperature")
        .await
        .unwrap_err();
    server.await.unwrap();

    match err {
        ClientError::Api(api) => {
            assert_eq!(api.kind, ApiErrorKind::Forbidden);
            assert_eq!(api.status, 403);
            assert_eq!(api.body, "namespace not licensed");
        }
        other => panic!("expected API error, got {other:?}"),
    }
}

#[tokio::test]
async fn undecodable_payload_is_a_decode_error() {
    let (host, server) = serve_once(200, "image/png", b"not a png".to_vec()).await;

    let err = client(&host)
        .tile(0, 0, 0, 0, "gfs.air_temperature")
        .await
        .unwrap_err();
    server.await.unwrap();

    assert!(matches!(err, ClientError::Decode(_)));
}

#[tokio::test]
async fn variable_metadata_is_cached_until_invalidated() {
    let body = br#"[{"name": "GFS", "variables": [{"namespace": "gfs", "name": "air_temperature", "unit": "K"}]}]"#;
    let (host, server) = serve_once(200, "application/json", body.to_vec()).await;

    let mut eo = client(&host);
    let var = eo.variable("gfs.air_temperature").await.unwrap();
    server.await.unwrap();
    assert_eq!(var.info().unwrap().details["unit"], "K");

    // Served from the cache: the stub is gone, so a request would fail
    let again = eo.variable("gfs.air_temperature").await.unwrap();
    assert_eq!(again.info(), var.info());
    assert!(eo.variable("gfs.unknown").await.unwrap().info().is_none());

    eo.invalidate_variables();
    assert!(eo.variables().await.is_err());
}

#[tokio::test]
async fn invalid_inputs_fail_before_any_request() {
    let eo = client("http://127.0.0.1:9");

    let err = eo.tile(5, 0, 1, 0, "gfs.air_temperature").await.unwrap_err();
    assert!(matches!(err, ClientError::Tile(_)));

    let err = eo.tile(0, 0, 0, "not a time", "gfs.air_temperature").await.unwrap_err();
    assert!(matches!(err, ClientError::Timestamp(_)));
}
