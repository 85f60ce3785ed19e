//! Seeded catalogs for reproducible tests.
//!
//! A [`TestCatalog`] holds an in-memory host with one organization, users in
//! every capacity, two licenses, and one public dataset with an uploaded
//! file and an external link, plus a [`Versioning`] wired to an in-memory
//! version store.

use dsversion_core::host::{Capacity, License, User};
use dsversion_core::{ActionContext, Dict, Host, MemoryHost, Versioning, VersionsConfig};
use dsversion_storage::MemoryVersionStore;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// Id of the seeded dataset.
pub const DATASET_ID: &str = "pkg_roads";
/// Name of the seeded dataset.
pub const DATASET_NAME: &str = "roads";
/// Id of the seeded uploaded resource.
pub const UPLOAD_ID: &str = "res_roads_csv";
/// Id of the seeded external link resource.
pub const LINK_ID: &str = "res_roads_api";
/// Site URL used by the fixture configuration.
pub const SITE_URL: &str = "http://catalog.test";

/// An in-memory catalog with versioning attached.
///
/// # Example
///
/// ```rust
/// use dsversion_test_utils::fixtures::TestCatalog;
///
/// let catalog = TestCatalog::new();
/// assert_eq!(catalog.editor.name, "editor");
/// ```
pub struct TestCatalog {
    pub host: Arc<MemoryHost>,
    pub versioning: Versioning,
    pub org_id: String,
    pub sysadmin: User,
    pub admin: User,
    pub editor: User,
    pub member: User,
    pub outsider: User,
}

impl TestCatalog {
    /// Seed a catalog whose configuration points at [`SITE_URL`].
    pub fn new() -> Self {
        let host = Arc::new(MemoryHost::new());
        let org_id = host.add_organization("transport").expect("add organization");

        let sysadmin = host.add_user("sysadmin", true).expect("add user");
        let admin = host.add_user("admin", false).expect("add user");
        let editor = host.add_user("editor", false).expect("add user");
        let member = host.add_user("member", false).expect("add user");
        let outsider = host.add_user("outsider", false).expect("add user");
        for (user, capacity) in [
            (&admin, Capacity::Admin),
            (&editor, Capacity::Editor),
            (&member, Capacity::Member),
        ] {
            host.add_member(&org_id, &user.id, capacity)
                .expect("add member");
        }

        for license in licenses() {
            host.add_license(license).expect("add license");
        }

        host.package_create(seed_dataset(&org_id), Some(admin.id.as_str()))
            .expect("create dataset");

        let versioning = Versioning::new(
            Host::from_shared(host.clone()),
            Arc::new(MemoryVersionStore::new()),
            VersionsConfig {
                site_url: SITE_URL.to_string(),
                ..VersionsConfig::default()
            },
        );

        Self {
            host,
            versioning,
            org_id,
            sysadmin,
            admin,
            editor,
            member,
            outsider,
        }
    }

    /// Context acting as the organization editor.
    pub fn editor_ctx(&self) -> ActionContext {
        ActionContext::user(self.editor.name.clone())
    }

    /// Context acting as the organization admin.
    pub fn admin_ctx(&self) -> ActionContext {
        ActionContext::user(self.admin.name.clone())
    }

    /// Context acting as a read-only organization member.
    pub fn member_ctx(&self) -> ActionContext {
        ActionContext::user(self.member.name.clone())
    }

    /// Context acting as a user outside the organization.
    pub fn outsider_ctx(&self) -> ActionContext {
        ActionContext::user(self.outsider.name.clone())
    }

    /// Overwrite top-level fields of the seeded dataset as the editor,
    /// recording a new activity.
    pub fn patch_dataset(&self, fields: Value) -> Dict {
        self.host
            .package_patch(DATASET_ID, dict(fields), Some(self.editor.id.as_str()))
            .expect("patch dataset")
    }

    /// Create another dataset in the organization.
    pub fn create_dataset(&self, name: &str) -> Dict {
        self.host
            .package_create(
                dict(json!({"name": name, "owner_org": self.org_id})),
                Some(self.admin.id.as_str()),
            )
            .expect("create dataset")
    }

    /// The live seeded dataset.
    pub fn dataset(&self) -> Dict {
        self.host
            .package(DATASET_ID)
            .expect("read dataset")
            .expect("seeded dataset")
    }
}

impl Default for TestCatalog {
    fn default() -> Self {
        Self::new()
    }
}

/// Licenses registered in the fixture catalog.
pub fn licenses() -> Vec<License> {
    vec![
        License {
            id: "odc-pddl".to_string(),
            title: "Open Data Commons Public Domain Dedication and License (PDDL)".to_string(),
            url: Some("http://www.opendefinition.org/licenses/odc-pddl".to_string()),
        },
        License {
            id: "odc-by".to_string(),
            title: "Open Data Commons Attribution License".to_string(),
            url: Some("http://www.opendefinition.org/licenses/odc-by".to_string()),
        },
    ]
}

fn seed_dataset(org_id: &str) -> Dict {
    dict(json!({
        "id": DATASET_ID,
        "name": DATASET_NAME,
        "title": "Road network",
        "notes": "All public roads.",
        "owner_org": org_id,
        "license_id": "odc-by",
        "resources": [
            {
                "id": UPLOAD_ID,
                "name": "roads.csv",
                "url_type": "upload",
                "url": format!("{SITE_URL}/dataset/{DATASET_ID}/resource/{UPLOAD_ID}/download/roads.csv"),
            },
            {
                "id": LINK_ID,
                "name": "Roads API",
                "url_type": "",
                "url": "https://api.example.com/roads",
            }
        ]
    }))
}

/// A catalog document for the CLI, written to a temporary directory.
pub struct CatalogFile {
    dir: TempDir,
}

impl CatalogFile {
    /// Write a catalog with one dataset created by `alice`.
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let catalog = json!({
            "users": [{"id": "usr_alice", "name": "alice"}],
            "licenses": licenses(),
            "datasets": [{
                "id": DATASET_ID,
                "name": DATASET_NAME,
                "creator_user_id": "usr_alice",
                "license_id": "odc-by",
                "resources": [
                    {"id": UPLOAD_ID, "url_type": "upload"},
                    {"id": LINK_ID, "url_type": ""}
                ]
            }]
        });
        std::fs::write(
            dir.path().join("catalog.json"),
            serde_json::to_string_pretty(&catalog).expect("serialize catalog"),
        )
        .expect("write catalog");
        Self { dir }
    }

    /// Path of the catalog document.
    pub fn path(&self) -> PathBuf {
        self.dir.path().join("catalog.json")
    }

    /// A fresh directory for the version table.
    pub fn storage_dir(&self) -> PathBuf {
        self.dir.path().join("versions")
    }
}

impl Default for CatalogFile {
    fn default() -> Self {
        Self::new()
    }
}

/// Convert a `json!` object into a [`Dict`].
pub fn dict(value: Value) -> Dict {
    value.as_object().cloned().unwrap_or_default()
}
