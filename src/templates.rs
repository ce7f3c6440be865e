use askama::Template;

use crate::models::GalleryImage;

#[derive(Template)]
#[template(path = "gallery.html")]
pub struct GalleryTemplate {
    pub images: Vec<GalleryImage>,
    pub errors: Vec<String>,
    pub app_name: &'static str,
    pub emoji_prefix: &'static str,
}

#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginTemplate {
    pub error: Option<String>,
    pub app_name: &'static str,
    pub emoji_prefix: &'static str,
}
