use std::path::Path;

use crate::handler::responses::{self, Reply};
use crate::handler::static_files;
use crate::http::HttpMethod;
use crate::log::Logger;

pub async fn route(
    root: &Path,
    error_page: &Path,
    method: HttpMethod,
    url: &str,
    log: &Logger,
) -> Reply {
    match method {
        HttpMethod::Get | HttpMethod::Head => static_files::serve(root, error_page, url, log).await,
        _ => responses::method_not_allowed(),
    }
}
