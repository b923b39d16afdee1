//! Client behavior against a minimal in-process HTTP responder.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;

use teamsync_clients::{DirectoryClient, GithubClient, HttpClient, TeamServiceClient};
use teamsync_core::{
    DirectorySource, OrgName, RemoteOrg, RemoteTeam, SourceError, TeamCreation,
    TeamMembershipSource, TeamName, Uid, Username,
};

// ---------------------------------------------------------------------------
// Responder
// ---------------------------------------------------------------------------

struct Reply {
    status: u16,
    headers: Vec<(String, String)>,
    body: String,
}

impl Reply {
    fn json(status: u16, body: &str) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

#[derive(Debug, Clone)]
struct Seen {
    method: String,
    target: String,
    body: String,
}

struct Responder {
    base: String,
    seen: Arc<Mutex<Vec<Seen>>>,
}

impl Responder {
    fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }
}

fn serve<F>(handler: F) -> Responder
where
    F: Fn(&str, &str) -> Reply + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { continue };
            handle(stream, &handler, &log);
        }
    });
    Responder {
        base: format!("http://{addr}"),
        seen,
    }
}

fn handle<F>(stream: TcpStream, handler: &F, log: &Arc<Mutex<Vec<Seen>>>)
where
    F: Fn(&str, &str) -> Reply,
{
    let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));
    let mut request_line = String::new();
    if reader.read_line(&mut request_line).unwrap_or(0) == 0 {
        return;
    }
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let target = parts.next().unwrap_or_default().to_string();

    let mut content_length = 0usize;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).unwrap_or(0) == 0 {
            break;
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().unwrap_or(0);
            }
        }
    }
    let mut body = vec![0u8; content_length];
    let _ = reader.read_exact(&mut body);

    log.lock().unwrap().push(Seen {
        method: method.clone(),
        target: target.clone(),
        body: String::from_utf8_lossy(&body).into_owned(),
    });

    let reply = handler(&method, &target);
    let payload = if method == "HEAD" { "" } else { reply.body.as_str() };
    let mut out = format!(
        "HTTP/1.1 {} Reply\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n",
        reply.status,
        payload.len()
    );
    for (name, value) in &reply.headers {
        out.push_str(&format!("{name}: {value}\r\n"));
    }
    out.push_str("\r\n");
    out.push_str(payload);

    let mut stream = stream;
    let _ = stream.write_all(out.as_bytes());
    let _ = stream.flush();
}

fn github(responder: &Responder) -> GithubClient {
    GithubClient::new(HttpClient::default(), responder.base.clone(), "gh-token")
}

fn team(id: u64, name: &str) -> RemoteTeam {
    RemoteTeam {
        id,
        name: TeamName::from(name),
    }
}

// ---------------------------------------------------------------------------
// GitHub: pagination
// ---------------------------------------------------------------------------

#[test]
fn list_teams_follows_next_links_across_pages() {
    let responder = serve(|_, target| {
        if target.contains("page=1") {
            Reply::json(200, r#"[{"id":1,"name":"alpha"},{"id":2,"name":"beta"}]"#).with_header(
                "Link",
                r#"<http://example/orgs/acme/teams?page=2>; rel="next", <http://example/orgs/acme/teams?page=2>; rel="last""#,
            )
        } else {
            Reply::json(200, r#"[{"id":3,"name":"gamma"}]"#)
        }
    });

    let teams = github(&responder)
        .list_teams(&OrgName::from("acme"))
        .expect("list teams");

    let names: Vec<_> = teams.keys().map(|n| n.as_str()).collect();
    assert_eq!(names, vec!["alpha", "beta", "gamma"]);
    assert_eq!(teams[&TeamName::from("gamma")].id, 3);

    let seen = responder.seen();
    assert_eq!(seen.len(), 2);
    assert!(seen[0].target.starts_with("/orgs/acme/teams?"));
    assert!(seen[0].target.contains("per_page=100"));
    assert!(seen[1].target.contains("page=2"));
}

#[test]
fn list_org_members_stops_without_link_header() {
    let responder = serve(|_, _| Reply::json(200, r#"[{"login":"alice"},{"login":"bob"}]"#));

    let members = github(&responder)
        .list_org_members(&OrgName::from("acme"))
        .expect("members");

    assert_eq!(members.len(), 2);
    assert!(members.contains(&Username::from("alice")));
    assert_eq!(responder.seen().len(), 1);
}

#[test]
fn list_team_members_uses_team_id() {
    let responder = serve(|_, _| Reply::json(200, r#"[{"login":"carol"}]"#));

    let members = github(&responder)
        .list_team_members(&team(42, "alpha"))
        .expect("members");

    assert!(members.contains(&Username::from("carol")));
    assert!(responder.seen()[0].target.starts_with("/teams/42/members"));
}

// ---------------------------------------------------------------------------
// GitHub: team creation
// ---------------------------------------------------------------------------

#[test]
fn ensure_team_exists_posts_description_and_admin_permission() {
    let responder = serve(|_, _| Reply::json(201, r#"{"id":7,"name":"stups"}"#));

    let created = github(&responder)
        .ensure_team_exists(&OrgName::from("acme"), &TeamName::from("stups"))
        .expect("create");

    assert_eq!(created, TeamCreation::Created(team(7, "stups")));
    let seen = responder.seen();
    assert_eq!(seen[0].method, "POST");
    assert_eq!(seen[0].target, "/orgs/acme/teams");
    let body: serde_json::Value = serde_json::from_str(&seen[0].body).expect("json body");
    assert_eq!(body["name"], "stups");
    assert_eq!(body["description"], "stups team");
    assert_eq!(body["permission"], "admin");
}

#[test]
fn ensure_team_exists_accepts_already_exists_code() {
    let responder = serve(|_, _| {
        Reply::json(
            422,
            r#"{"message":"Validation Failed","errors":[{"resource":"Team","code":"already_exists","field":"name"}]}"#,
        )
    });

    let outcome = github(&responder)
        .ensure_team_exists(&OrgName::from("acme"), &TeamName::from("stups"))
        .expect("already exists is success");
    assert_eq!(outcome, TeamCreation::AlreadyExists);
}

#[test]
fn ensure_team_exists_accepts_uniqueness_message() {
    let responder = serve(|_, _| {
        Reply::json(
            422,
            r#"{"message":"Validation Failed","errors":[{"code":"custom","message":"Name must be unique for this org"}]}"#,
        )
    });

    let outcome = github(&responder)
        .ensure_team_exists(&OrgName::from("acme"), &TeamName::from("stups"))
        .expect("already exists is success");
    assert_eq!(outcome, TeamCreation::AlreadyExists);
}

#[test]
fn ensure_team_exists_escalates_other_errors() {
    let responder = serve(|_, _| Reply::json(403, r#"{"message":"Must have admin rights"}"#));

    let err = github(&responder)
        .ensure_team_exists(&OrgName::from("acme"), &TeamName::from("stups"))
        .unwrap_err();
    match err {
        SourceError::RemoteStatus { status, body, .. } => {
            assert_eq!(status, 403);
            assert!(body.contains("admin rights"));
        }
        other => panic!("expected status error, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// GitHub: probe and mutations
// ---------------------------------------------------------------------------

#[test]
fn user_exists_maps_statuses() {
    let responder = serve(|_, target| match target {
        "/users/alice" => Reply::json(200, ""),
        "/users/mallory" => Reply::json(404, ""),
        _ => Reply::json(502, ""),
    });
    let client = github(&responder);

    assert!(client.user_exists(&Username::from("alice")).expect("alice"));
    assert!(!client.user_exists(&Username::from("mallory")).expect("mallory"));
    let err = client.user_exists(&Username::from("flaky")).unwrap_err();
    assert!(matches!(err, SourceError::RemoteStatus { status: 502, .. }), "got {err:?}");
    assert!(responder.seen().iter().all(|s| s.method == "HEAD"));
}

#[test]
fn membership_mutations_use_put_and_delete() {
    let responder = serve(|method, _| match method {
        "PUT" => Reply::json(200, r#"{"state":"active"}"#),
        "DELETE" => Reply::json(204, ""),
        _ => Reply::json(405, ""),
    });
    let client = github(&responder);
    let alpha = team(9, "alpha");

    client.add_member(&alpha, &Username::from("alice")).expect("add");
    client.remove_member(&alpha, &Username::from("bob")).expect("remove");

    let seen = responder.seen();
    assert_eq!(seen[0].method, "PUT");
    assert_eq!(seen[0].target, "/teams/9/memberships/alice");
    assert_eq!(seen[1].method, "DELETE");
    assert_eq!(seen[1].target, "/teams/9/memberships/bob");
}

#[test]
fn failed_mutation_is_an_error() {
    let responder = serve(|_, _| Reply::json(403, r#"{"message":"Forbidden"}"#));
    let err = github(&responder)
        .add_member(&team(9, "alpha"), &Username::from("alice"))
        .unwrap_err();
    assert!(matches!(err, SourceError::RemoteStatus { status: 403, .. }));
}

// ---------------------------------------------------------------------------
// Team service
// ---------------------------------------------------------------------------

#[test]
fn team_service_skips_empty_ids_and_failing_details() {
    let responder = serve(|_, target| match target {
        "/teams" => Reply::json(
            200,
            r#"[{"id":"stups"},{"id":""},{"id":null},{"id":"broken"},{"id":"greendale"}]"#,
        ),
        "/teams/stups" => Reply::json(200, r#"{"id":"stups","member":["u1","u2"]}"#),
        "/teams/greendale" => Reply::json(200, r#"{"id":"greendale","member":["u1"]}"#),
        _ => Reply::json(500, "boom"),
    });

    let client = TeamServiceClient::new(HttpClient::default(), responder.base.clone(), "svc");
    let memberships = client.list_team_memberships().expect("memberships");

    assert_eq!(memberships.uid_count(), 2);
    assert_eq!(memberships.teams_of(&Uid::from("u1")).len(), 2);
    assert!(!memberships.managed_teams().contains(&TeamName::from("broken")));

    let targets: Vec<_> = responder.seen().into_iter().map(|s| s.target).collect();
    assert!(!targets.iter().any(|t| t == "/teams/"));
}

#[test]
fn team_service_tolerates_untyped_ids() {
    let responder = serve(|_, target| match target {
        "/teams" => Reply::json(
            200,
            r#"[{"id":0},{"id":false},{"id":true},{"id":17},{},{"id":"stups"}]"#,
        ),
        "/teams/17" => Reply::json(200, r#"{"id":17,"member":["u1"]}"#),
        "/teams/stups" => Reply::json(200, r#"{"id":"stups","member":["u2"]}"#),
        _ => Reply::json(500, "boom"),
    });

    let client = TeamServiceClient::new(HttpClient::default(), responder.base.clone(), "svc");
    let memberships = client.list_team_memberships().expect("memberships");

    let managed: Vec<_> = memberships
        .managed_teams()
        .into_iter()
        .map(|t| t.0)
        .collect();
    assert_eq!(managed, vec!["17".to_owned(), "stups".to_owned()]);
    let targets: Vec<_> = responder.seen().into_iter().map(|s| s.target).collect();
    assert_eq!(targets.len(), 3, "requests: {targets:?}");
}

#[test]
fn team_service_listing_failure_is_fatal() {
    let responder = serve(|_, _| Reply::json(503, "down"));
    let client = TeamServiceClient::new(HttpClient::default(), responder.base.clone(), "svc");
    let err = client.list_team_memberships().unwrap_err();
    assert!(matches!(err, SourceError::TeamServiceUnavailable { .. }), "got {err:?}");
}

// ---------------------------------------------------------------------------
// Directory
// ---------------------------------------------------------------------------

#[test]
fn directory_joins_active_employees_with_accounts() {
    let responder = serve(|_, target| {
        if target.starts_with("/employees?account=github") {
            Reply::json(
                200,
                r#"{"u1":["https://github.com/alice"],"u2":["bob"],"u3":["carol","carol-alt"]}"#,
            )
        } else {
            Reply::json(
                200,
                r#"[{"login":"u1","email":"u1@example.org"},{"login":"u2","email":"u2@example.org","inactive":true},{"login":"u3","email":"u3@example.org","inactive":false}]"#,
            )
        }
    });

    let client = DirectoryClient::new(HttpClient::default(), responder.base.clone(), "svc", "github");
    let pairs = client.list_active_external_mappings().expect("mappings");

    let expected: Vec<(Username, Uid)> = vec![
        (Username::from("alice"), Uid::from("u1")),
        (Username::from("carol"), Uid::from("u3")),
        (Username::from("carol-alt"), Uid::from("u3")),
    ];
    assert_eq!(pairs.into_iter().collect::<Vec<_>>(), expected);
}

#[test]
fn directory_unreachable_is_directory_unavailable() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let client = DirectoryClient::new(HttpClient::default(), format!("http://{addr}"), "svc", "github");
    let err = client.list_active_external_mappings().unwrap_err();
    assert!(matches!(err, SourceError::DirectoryUnavailable { .. }), "got {err:?}");
}
