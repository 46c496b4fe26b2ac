//! # Listado de Directorios
//! src/server/listing.rs
//!
//! Listados de directorio en HTML.

use crate::fileserver::DirEntryInfo;

const DOCUMENT_HEAD: &str = r#"<!DOCTYPE HTML PUBLIC "-//W3C//DTD HTML 4.01//EN" "http://www.w3.org/TR/html4/strict.dtd">
<html>
<head>
<meta http-equiv="Content-Type" content="text/html; charset=utf-8">
"#;

/// Renderiza el listado de `relative_path`. Los directorios llevan `/` al
/// final; el orden es el de `entries`.
pub fn render(relative_path: &str, entries: &[DirEntryInfo]) -> String {
    let title = format!("/{}", relative_path);
    let items: Vec<String> = entries
        .iter()
        .map(|entry| {
            let name = if entry.is_dir {
                format!("{}/", entry.name)
            } else {
                entry.name.clone()
            };
            format!("<li><a href=\"{}\">{}</a></li>", name, name)
        })
        .collect();

    format!(
        "{head}<title>Directory listing for {title}</title>\n\
         </head>\n\
         <body>\n\
         <h1>Directory listing for {title}</h1>\n\
         <hr>\n\
         <ul>\n\
         {items}\n\
         </ul>\n\
         <hr>\n\
         </body>\n\
         </html>\n",
        head = DOCUMENT_HEAD,
        title = title,
        items = items.join("\n"),
    )
}
