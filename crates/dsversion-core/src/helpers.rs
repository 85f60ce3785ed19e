//! Small pure helpers over host dataset and resource dicts.
//!
//! [`download_url`] and [`is_upload`] back snapshot reconstruction. The rest
//! are for the catalog's page templates, which call them when rendering a
//! dataset: [`has_link_resources`] decides whether to show the note that
//! linked files are not versioned, and [`order_views`] runs over the
//! host's resource view list so the versions view renders last.

use crate::host::Dict;
use serde_json::Value;
use url::Url;

/// Rewrite an upload URL so it downloads the copy bound to `version_ref`.
///
/// `{base}/download/{filename}` becomes
/// `{base}/version/{version_ref}/download/{filename}`. URLs outside
/// `site_url` (external links) and URLs without a `/download/` segment are
/// returned unchanged.
pub fn download_url(site_url: &str, resource_url: &str, version_ref: &str) -> String {
    if !is_hosted(site_url, resource_url) {
        return resource_url.to_string();
    }

    match resource_url.split_once("/download/") {
        Some((base, filename)) => format!("{base}/version/{version_ref}/download/{filename}"),
        None => resource_url.to_string(),
    }
}

/// Same origin as the site, under the site's path.
fn is_hosted(site_url: &str, resource_url: &str) -> bool {
    let (Ok(site), Ok(resource)) = (Url::parse(site_url), Url::parse(resource_url)) else {
        return false;
    };
    site.origin() == resource.origin()
        && resource
            .path()
            .starts_with(site.path().trim_end_matches('/'))
}

/// Whether any resource of the dataset links to an external URL.
pub fn has_link_resources(package: &Dict) -> bool {
    package
        .get("resources")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
        .any(|resource| match resource.get("url_type") {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.is_empty(),
            Some(_) => false,
        })
}

/// Whether the resource is a file uploaded to the catalog.
pub fn is_upload(resource: &Dict) -> bool {
    resource.get("url_type").and_then(Value::as_str) == Some("upload")
}

/// Move views of `last_type` after all others, keeping relative order.
pub fn order_views(views: &mut [Dict], last_type: &str) {
    views.sort_by_key(|view| view.get("view_type").and_then(Value::as_str) == Some(last_type));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SITE: &str = "http://localhost:5000";

    fn dict(value: Value) -> Dict {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_download_url_for_upload() {
        let url = "http://localhost:5000/dataset/pkg_1/resource/res_1/download/roads.csv";
        assert_eq!(
            download_url(SITE, url, "ver_1"),
            "http://localhost:5000/dataset/pkg_1/resource/res_1/version/ver_1/download/roads.csv"
        );
    }

    #[test]
    fn test_download_url_leaves_external_links() {
        let url = "https://example.com/download/roads.csv";
        assert_eq!(download_url(SITE, url, "ver_1"), url);

        let url = "http://localhost:5000/dataset/pkg_1/resource/res_1";
        assert_eq!(download_url(SITE, url, "ver_1"), url);

        let url = "http://localhost:50001/dataset/pkg_1/resource/res_1/download/roads.csv";
        assert_eq!(download_url(SITE, url, "ver_1"), url);

        let url = "http://localhost:5000/dataset/pkg_1/resource/res_1/download/roads.csv";
        assert_eq!(download_url("", url, "ver_1"), url);
    }

    #[test]
    fn test_has_link_resources() {
        let uploads = dict(json!({"resources": [{"url_type": "upload"}]}));
        assert!(!has_link_resources(&uploads));

        let mixed = dict(json!({"resources": [{"url_type": "upload"}, {"url_type": ""}]}));
        assert!(has_link_resources(&mixed));

        let null = dict(json!({"resources": [{"url_type": null}]}));
        assert!(has_link_resources(&null));

        assert!(!has_link_resources(&dict(json!({}))));
    }

    #[test]
    fn test_order_views_moves_type_last() {
        let mut views: Vec<Dict> = ["versions_view", "datatables_view", "image_view"]
            .iter()
            .map(|t| dict(json!({"view_type": t})))
            .collect();

        order_views(&mut views, "versions_view");

        let order: Vec<&str> = views
            .iter()
            .filter_map(|v| v.get("view_type").and_then(Value::as_str))
            .collect();
        assert_eq!(order, vec!["datatables_view", "image_view", "versions_view"]);
    }
}
