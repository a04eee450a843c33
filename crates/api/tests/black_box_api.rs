use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{json, Value};

use tenantgate_infra::GateConfig;

const JWT_SECRET: &str = "test-secret";
const OPERATOR_KEY: &str = "operator-test-key";
const PASSWORD: &str = "correct horse battery";

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        let config = GateConfig {
            jwt_secret: JWT_SECRET.to_string(),
            operator_key: Some(OPERATOR_KEY.to_string()),
            ..GateConfig::default()
        };

        // Same router as prod, bound to an ephemeral port.
        let app = tenantgate_api::app::build_app(config)
            .await
            .expect("failed to build app");
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            client: reqwest::Client::new(),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn provision(&self, name: &str, slug: &str, owner_email: &str) -> reqwest::Response {
        self.client
            .post(self.url("/tenants"))
            .bearer_auth(OPERATOR_KEY)
            .json(&json!({ "name": name, "slug": slug, "owner_email": owner_email }))
            .send()
            .await
            .unwrap()
    }

    async fn signup(&self, email: &str) -> reqwest::Response {
        self.client
            .post(self.url("/auth/signup"))
            .json(&json!({ "email": email, "password": PASSWORD, "first_name": "Test" }))
            .send()
            .await
            .unwrap()
    }

    async fn sign_in(&self, email: &str) -> String {
        let res = self
            .client
            .post(self.url("/auth/token"))
            .json(&json!({ "email": email, "password": PASSWORD }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["token_type"], "bearer");
        body["access_token"].as_str().unwrap().to_string()
    }

    async fn post(&self, path: &str, token: &str, body: Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    async fn get(&self, path: &str, token: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .unwrap()
    }

    /// Provision a tenant and onboard its owner; returns (tenant_id, owner_role_id, token).
    async fn onboarded_owner(&self, slug: &str) -> (String, String, String) {
        let email = format!("owner@{slug}.test");
        let res = self.provision(slug, slug, &email).await;
        assert_eq!(res.status(), StatusCode::CREATED);
        let body: Value = res.json().await.unwrap();

        assert_eq!(self.signup(&email).await.status(), StatusCode::CREATED);
        let token = self.sign_in(&email).await;
        (
            body["tenant_id"].as_str().unwrap().to_string(),
            body["owner_role_id"].as_str().unwrap().to_string(),
            token,
        )
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn item_ids(body: &Value) -> Vec<String> {
    body["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["id"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;
    let res = srv.client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn auth_required_for_member_endpoints() {
    let srv = TestServer::spawn().await;

    for path in ["/whoami", "/roles", "/invitations"] {
        let res = srv.client.get(srv.url(path)).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED, "{path}");
    }
}

#[tokio::test]
async fn provisioning_requires_the_operator_key() {
    let srv = TestServer::spawn().await;

    let res = srv
        .client
        .post(srv.url("/tenants"))
        .bearer_auth("not-the-operator")
        .json(&json!({ "name": "Acme", "slug": "acme" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = srv
        .client
        .post(srv.url("/tenants"))
        .json(&json!({ "name": "Acme", "slug": "acme" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn duplicate_slug_conflicts() {
    let srv = TestServer::spawn().await;

    assert_eq!(
        srv.provision("Acme", "acme", "a@acme.test").await.status(),
        StatusCode::CREATED
    );
    let res = srv.provision("Acme Two", "acme", "b@acme.test").await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "duplicate_slug");
}

#[tokio::test]
async fn orphan_signup_is_rejected() {
    let srv = TestServer::spawn().await;

    let res = srv.signup("stranger@nowhere.test").await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "no_pending_invitation");
    assert_eq!(body["message"], "No pending invitation found for this email");

    // No identity was left behind.
    let res = srv
        .client
        .post(srv.url("/auth/token"))
        .json(&json!({ "email": "stranger@nowhere.test", "password": PASSWORD }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn owner_builds_hierarchy_and_onboards_a_member() {
    let srv = TestServer::spawn().await;
    let (tenant_id, owner_role, owner_token) = srv.onboarded_owner("acme").await;

    let res = srv.get("/whoami", &owner_token).await;
    assert_eq!(res.status(), StatusCode::OK);
    let me: Value = res.json().await.unwrap();
    assert_eq!(me["tenant_id"], tenant_id.as_str());
    assert_eq!(me["role"], owner_role.as_str());

    // Owner role is created at provisioning; a manager role hangs under it.
    let res = srv
        .post(
            "/roles",
            &owner_token,
            json!({ "name": "manager", "permissions": ["deals:read"], "parent_role_id": owner_role }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let manager: Value = res.json().await.unwrap();
    let manager_id = manager["id"].as_str().unwrap().to_string();

    let res = srv
        .post("/roles", &owner_token, json!({ "name": "viewer", "permissions": ["deals:read"] }))
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let viewer_id = res.json::<Value>().await.unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();

    let res = srv
        .post(
            "/hierarchy",
            &owner_token,
            json!({ "parent_role_id": manager_id, "child_role_id": viewer_id }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);

    // Closing the loop is rejected.
    let res = srv
        .post(
            "/hierarchy",
            &owner_token,
            json!({ "parent_role_id": viewer_id, "child_role_id": owner_role }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let res = srv
        .get(&format!("/roles/{owner_role}/descendants"), &owner_token)
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let descendants = item_ids(&res.json().await.unwrap());
    assert!(descendants.contains(&manager_id));
    assert!(descendants.contains(&viewer_id));

    // Owner invites a manager; the manager signs up and lands in the tenant.
    let res = srv
        .post(
            "/invitations",
            &owner_token,
            json!({ "email": "manager@acme.test", "target_role_id": manager_id }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let invitation: Value = res.json().await.unwrap();
    assert_eq!(invitation["status"], "pending");
    assert_eq!(invitation["tenant_id"], tenant_id.as_str());

    let res = srv.signup("Manager@Acme.test").await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let profile: Value = res.json().await.unwrap();
    assert_eq!(profile["tenant_id"], tenant_id.as_str());
    assert_eq!(profile["role_id"], manager_id.as_str());

    let manager_token = srv.sign_in("manager@acme.test").await;
    let me: Value = srv.get("/whoami", &manager_token).await.json().await.unwrap();
    assert_eq!(me["role"], manager_id.as_str());
    let desc = me["descendants"].as_array().unwrap();
    assert!(desc.iter().any(|d| d == viewer_id.as_str()));
    assert!(!desc.iter().any(|d| d == owner_role.as_str()));

    // A manager may invite into its own subtree but not above it.
    let res = srv
        .post(
            "/invitations",
            &manager_token,
            json!({ "email": "viewer@acme.test", "target_role_id": viewer_id }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = srv
        .post(
            "/invitations",
            &manager_token,
            json!({ "email": "boss@acme.test", "target_role_id": owner_role }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    // Signup is single-use.
    let res = srv.signup("manager@acme.test").await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "already_onboarded");

    let res = srv.get("/invitations", &owner_token).await;
    let list: Value = res.json().await.unwrap();
    let statuses: Vec<&str> = list["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["status"].as_str().unwrap())
        .collect();
    assert!(statuses.contains(&"accepted"));
    assert!(statuses.contains(&"pending"));
}

#[tokio::test]
async fn cross_tenant_invite_is_forbidden() {
    let srv = TestServer::spawn().await;
    let (tenant_a, _, token_a) = srv.onboarded_owner("alpha").await;
    let (tenant_b, role_b, _) = srv.onboarded_owner("beta").await;

    // Spoofed tenant_id is ignored; the foreign role is then out of scope.
    let res = srv
        .post(
            "/invitations",
            &token_a,
            json!({ "email": "spy@beta.test", "target_role_id": role_b, "tenant_id": tenant_b }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = srv.get("/roles", &token_a).await;
    let roles: Value = res.json().await.unwrap();
    assert!(roles["items"]
        .as_array()
        .unwrap()
        .iter()
        .all(|r| r["tenant_id"] == tenant_a.as_str()));
    assert!(!item_ids(&roles).contains(&role_b));

    let res = srv
        .get(&format!("/roles/{role_b}/descendants"), &token_a)
        .await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn tokens_signed_with_another_key_are_rejected() {
    let srv = TestServer::spawn().await;
    let (tenant_id, owner_role, _) = srv.onboarded_owner("gamma").await;

    let now = Utc::now().timestamp();
    let forged = jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &json!({
            "sub": uuid_like(),
            "app_metadata": {
                "tenant_id": tenant_id,
                "role": owner_role,
                "descendants": [],
                "hierarchy_version": 0,
            },
            "iat": now,
            "exp": now + 600,
        }),
        &EncodingKey::from_secret(b"some-other-secret"),
    )
    .expect("failed to encode jwt");

    let res = srv.get("/whoami", &forged).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

fn uuid_like() -> String {
    "0190b6d0-0000-7000-8000-000000000001".to_string()
}
