use crate::archive::zip_directory;
use crate::error::{IoContext, SaveError, SaveResult};
use crate::saves::{SaveEntry, SaveFlags, SaveList, SaveType};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// What a request resolves to.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    File { path: PathBuf, content_type: &'static str },
    Body { data: Vec<u8>, content_type: &'static str },
}

/// Request handler run on the server thread.
pub trait Router: Send {
    fn handle(&self, path: &str) -> SaveResult<Reply>;
}

/// Catalog routes, one per URL pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// `/`
    Index,
    /// `/PSP/games.txt`
    Games,
    /// `/PSP/<9-char id>/saves.txt`
    Saves(String),
    /// `/zip/<8 digits>/<id>_<dir>.zip` or `/PSP/<9-char id>/<8 digits>.zip`
    Zip(usize),
    /// `/PSP/<9-char id>/ICON0.PNG`
    TitleIcon(String),
    /// `/icon/<8 hex>/ICON0.PNG`
    Icon(usize),
}

fn is_digits(s: &str, n: usize) -> bool {
    s.len() == n && s.bytes().all(|b| b.is_ascii_digit())
}

fn is_hex(s: &str, n: usize) -> bool {
    s.len() == n && s.bytes().all(|b| b.is_ascii_hexdigit())
}

pub fn parse_route(path: &str) -> Option<Route> {
    if path == "/" {
        return Some(Route::Index);
    }
    let parts: Vec<&str> = path.strip_prefix('/')?.split('/').collect();
    match parts.as_slice() {
        ["PSP", "games.txt"] => Some(Route::Games),
        ["PSP", id, "saves.txt"] if id.len() == 9 => Some(Route::Saves(id.to_string())),
        ["PSP", id, "ICON0.PNG"] if id.len() == 9 => Some(Route::TitleIcon(id.to_string())),
        ["PSP", id, file] if id.len() == 9 => {
            let num = file.strip_suffix(".zip")?;
            is_digits(num, 8).then(|| num.parse().ok()).flatten().map(Route::Zip)
        }
        ["zip", num, file] if is_digits(num, 8) => {
            let ok = file.ends_with(".zip") && file.as_bytes().get(9) == Some(&b'_');
            ok.then(|| num.parse().ok()).flatten().map(Route::Zip)
        }
        ["icon", num, "ICON0.PNG"] if is_hex(num, 8) => usize::from_str_radix(num, 16).ok().map(Route::Icon),
        _ => None,
    }
}

/// Decode `%XX` escapes; malformed escapes are kept as-is.
pub fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if let Some(v) = s.get(i + 1..i + 3).and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(v);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;").replace('"', "&quot;")
}

fn not_found(path: &str) -> SaveError {
    SaveError::not_found(format!("route {}", path))
}

/// Serves a snapshot of a save list.
pub struct CatalogRouter {
    list: SaveList,
    cache: PathBuf,
}

impl CatalogRouter {
    pub fn new(list: SaveList, cache: &Path) -> Self {
        Self {
            list,
            cache: cache.to_path_buf(),
        }
    }

    fn is_save(&self, index: usize, e: &SaveEntry) -> bool {
        !self.list.is_menu(index) && e.kind == SaveType::Psp && e.flags.intersects(SaveFlags::PS1 | SaveFlags::PSP)
    }

    fn psp_saves(&self) -> impl Iterator<Item = (usize, &SaveEntry)> {
        self.list
            .entries
            .iter()
            .enumerate()
            .filter(|(i, e)| !self.list.is_menu(*i) && e.flags.contains(SaveFlags::PSP))
    }

    fn save_at(&self, index: usize, path: &str) -> SaveResult<&SaveEntry> {
        self.list
            .entries
            .get(index)
            .filter(|e| self.is_save(index, e))
            .ok_or_else(|| not_found(path))
    }

    /// HTML index, cached under a hash of every display name.
    fn index(&self) -> SaveResult<Reply> {
        let mut hasher = Sha256::new();
        for e in &self.list.entries {
            hasher.update(e.name.as_bytes());
        }
        let digest = hasher.finalize();
        let page = self.cache.join(format!("web{}.html", hex::encode(&digest[..16])));
        if page.is_file() {
            return Ok(Reply::File {
                path: page,
                content_type: "text/html; charset=utf-8",
            });
        }

        let mut html = String::new();
        let _ = write!(
            html,
            "<html><head><meta charset=\"UTF-8\"><title>Save Tool</title></head><body>\
             <h1>Save Tool</h1><h2>Index of {}</h2><table><thead><tr><th>Name</th><th>Icon</th>\
             <th>Title ID</th><th>Folder</th><th>Location</th></tr></thead><tbody>",
            escape_html(&self.list.root)
        );
        for (i, e) in self.list.entries.iter().enumerate() {
            if !self.is_save(i, e) {
                continue;
            }
            let _ = write!(
                html,
                "<tr><td><a href=\"/zip/{i:08}/{tid}_{dir}.zip\">{name}</a></td>\
                 <td><img src=\"/icon/{i:08x}/ICON0.PNG\" alt=\"{name}\" height=\"80\"></td>\
                 <td>{tid}</td><td>{dir}</td><td>{loc}</td></tr>",
                tid = escape_html(&e.title_id),
                dir = escape_html(&e.dir_name),
                name = escape_html(&e.name),
                loc = escape_html(&self.list.title),
            );
        }
        html.push_str("</tbody></table></body></html>");

        fs::create_dir_all(&self.cache).at(&self.cache)?;
        fs::write(&page, html).at(&page)?;
        log::debug!("[web] Built {}", page.display());
        Ok(Reply::File {
            path: page,
            content_type: "text/html; charset=utf-8",
        })
    }

    fn games(&self) -> Reply {
        let mut text = String::new();
        for (_, e) in self.psp_saves() {
            let _ = writeln!(text, "{}={}", e.title_id, e.name);
        }
        Reply::Body {
            data: text.into_bytes(),
            content_type: "text/plain; charset=utf-8",
        }
    }

    fn saves(&self, title: &str) -> Reply {
        let mut text = String::new();
        for (i, e) in self.psp_saves().filter(|(_, e)| e.title_id.starts_with(title)) {
            let _ = writeln!(text, "{:08}.zip=({}) {}", i, e.dir_name, e.name);
        }
        Reply::Body {
            data: text.into_bytes(),
            content_type: "text/plain; charset=utf-8",
        }
    }

    /// Zip of the save directory, rebuilt on every request so edits made
    /// while serving are picked up.
    fn zip(&self, index: usize, path: &str) -> SaveResult<Reply> {
        let e = self.save_at(index, path)?;
        let out = self.cache.join(format!("{}_{}.zip", e.title_id, e.dir_name));
        let tmp = out.with_extension("zip.part");
        let dir = e.local_path();
        let base = dir.parent().unwrap_or(dir);
        fs::create_dir_all(&self.cache).at(&self.cache)?;
        zip_directory(base, dir, &tmp)?;
        fs::rename(&tmp, &out).at(&out)?;
        Ok(Reply::File {
            path: out,
            content_type: "application/zip",
        })
    }

    fn icon(e: &SaveEntry, path: &str) -> SaveResult<Reply> {
        let icon = e.local_path().join("ICON0.PNG");
        if !icon.is_file() {
            return Err(not_found(path));
        }
        Ok(Reply::File {
            path: icon,
            content_type: "image/png",
        })
    }
}

impl Router for CatalogRouter {
    fn handle(&self, path: &str) -> SaveResult<Reply> {
        match parse_route(path).ok_or_else(|| not_found(path))? {
            Route::Index => self.index(),
            Route::Games => Ok(self.games()),
            Route::Saves(title) => Ok(self.saves(&title)),
            Route::Zip(index) => self.zip(index, path),
            Route::TitleIcon(title) => {
                let (_, e) = self
                    .psp_saves()
                    .find(|(_, e)| e.title_id.starts_with(&title))
                    .ok_or_else(|| not_found(path))?;
                Self::icon(e, path)
            }
            Route::Icon(index) => Self::icon(self.save_at(index, path)?, path),
        }
    }
}

/// Serves any file below `root`; directories get a plain listing.
/// Paths arrive already percent-decoded.
pub struct FileRouter {
    root: PathBuf,
}

impl FileRouter {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    fn resolve(&self, path: &str) -> Option<PathBuf> {
        let rel = Path::new(path.trim_start_matches('/'));
        if rel.components().any(|c| !matches!(c, Component::Normal(_))) {
            return None;
        }
        Some(self.root.join(rel))
    }
}

impl Router for FileRouter {
    fn handle(&self, path: &str) -> SaveResult<Reply> {
        let target = self.resolve(path).ok_or_else(|| not_found(path))?;

        if target.is_dir() {
            let mut names: Vec<String> = fs::read_dir(&target)
                .at(&target)?
                .filter_map(|e| e.ok())
                .map(|e| {
                    let mut name = e.file_name().to_string_lossy().into_owned();
                    if e.path().is_dir() {
                        name.push('/');
                    }
                    name
                })
                .collect();
            names.sort();
            let base = path.trim_end_matches('/');
            let mut html = format!("<html><body><h2>Index of {}/</h2><ul>", escape_html(base));
            for n in names {
                let _ = write!(html, "<li><a href=\"{}/{}\">{}</a></li>", base, n, escape_html(&n));
            }
            html.push_str("</ul></body></html>");
            return Ok(Reply::Body {
                data: html.into_bytes(),
                content_type: "text/html; charset=utf-8",
            });
        }

        if !target.is_file() {
            return Err(not_found(path));
        }
        Ok(Reply::File {
            path: target,
            content_type: "application/octet-stream",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(reply: Reply) -> String {
        match reply {
            Reply::Body { data, .. } => String::from_utf8(data).unwrap(),
            Reply::File { path, .. } => fs::read_to_string(path).unwrap(),
        }
    }

    fn catalog(root: &Path) -> CatalogRouter {
        let mut list = SaveList::new("Memory Stick Saves", root.to_string_lossy());
        for (dir, name) in [("ULUS10041DATA00", "Game One"), ("ULUS10041DATA01", "Game One B"), ("ULES00002SAVE", "Two")] {
            let path = root.join(dir);
            fs::create_dir_all(&path).unwrap();
            fs::write(path.join("DATA.BIN"), name).unwrap();
            let mut e = SaveEntry::new(SaveType::Psp, SaveFlags::PSP | SaveFlags::HDD, name);
            e.title_id = dir[..9].to_string();
            e.dir_name = dir.to_string();
            e.path = path.to_string_lossy().into_owned();
            list.entries.push(e);
        }
        fs::write(root.join("ULES00002SAVE/ICON0.PNG"), b"PNG").unwrap();
        list.push_menu(SaveEntry::new(SaveType::Menu, SaveFlags::PSP, "Bulk Save Management"));
        CatalogRouter::new(list, &root.join("CACHE"))
    }

    // ── parse_route ──

    #[test]
    fn test_routes() {
        assert_eq!(parse_route("/"), Some(Route::Index));
        assert_eq!(parse_route("/PSP/games.txt"), Some(Route::Games));
        assert_eq!(parse_route("/PSP/ULUS10041/saves.txt"), Some(Route::Saves("ULUS10041".into())));
        assert_eq!(parse_route("/PSP/ULUS10041/00000002.zip"), Some(Route::Zip(2)));
        assert_eq!(parse_route("/zip/00000012/ULUS10041_ULUS10041DATA00.zip"), Some(Route::Zip(12)));
        assert_eq!(parse_route("/icon/0000000a/ICON0.PNG"), Some(Route::Icon(10)));
        assert_eq!(parse_route("/PSP/ULUS1004/saves.txt"), None);
        assert_eq!(parse_route("/zip/0000001/x.zip"), None);
        assert_eq!(parse_route("/etc/passwd"), None);
    }

    #[test]
    fn test_percent_decode() {
        assert_eq!(percent_decode("/a%20b/%zz"), "/a b/%zz");
    }

    // ── CatalogRouter ──

    #[test]
    fn test_saves_index_uses_list_positions() {
        let tmp = tempfile::tempdir().unwrap();
        let r = catalog(tmp.path());
        let text = body(r.handle("/PSP/ULUS10041/saves.txt").unwrap());
        assert_eq!(
            text,
            "00000001.zip=(ULUS10041DATA00) Game One\n00000002.zip=(ULUS10041DATA01) Game One B\n"
        );
        let games = body(r.handle("/PSP/games.txt").unwrap());
        assert_eq!(games.lines().count(), 3);
    }

    #[test]
    fn test_zip_on_demand() {
        let tmp = tempfile::tempdir().unwrap();
        let r = catalog(tmp.path());
        let Reply::File { path, content_type } = r.handle("/PSP/ULES00002/00000003.zip").unwrap() else {
            panic!("expected a file");
        };
        assert_eq!(content_type, "application/zip");
        assert!(path.ends_with("ULES00002_ULES00002SAVE.zip"));
        assert!(path.is_file());
        assert!(matches!(r.handle("/PSP/ULES00002/00000000.zip"), Err(SaveError::NotFound(_))));
        assert!(matches!(r.handle("/PSP/ULES00002/00000099.zip"), Err(SaveError::NotFound(_))));
    }

    #[test]
    fn test_zip_reflects_later_edits() {
        let tmp = tempfile::tempdir().unwrap();
        let r = catalog(tmp.path());
        let extracted = |name: &str| {
            let Reply::File { path, .. } = r.handle("/PSP/ULES00002/00000003.zip").unwrap() else {
                panic!("expected a file");
            };
            let dest = tmp.path().join(name);
            crate::archive::extract_zip(&path, &dest).unwrap();
            fs::read_to_string(dest.join("ULES00002SAVE/DATA.BIN")).unwrap()
        };
        assert_eq!(extracted("first"), "Two");

        fs::write(tmp.path().join("ULES00002SAVE/DATA.BIN"), "edited").unwrap();
        assert_eq!(extracted("second"), "edited");
        assert!(!tmp.path().join("CACHE/ULES00002_ULES00002SAVE.zip.part").exists());
    }

    #[test]
    fn test_index_cached_by_names() {
        let tmp = tempfile::tempdir().unwrap();
        let r = catalog(tmp.path());
        let Reply::File { path: first, .. } = r.handle("/").unwrap() else {
            panic!("expected a file");
        };
        let html = fs::read_to_string(&first).unwrap();
        assert!(html.contains("/zip/00000001/ULUS10041_ULUS10041DATA00.zip"));
        assert!(!html.contains("Bulk Save Management"));

        fs::write(&first, "cached").unwrap();
        assert_eq!(body(r.handle("/").unwrap()), "cached");
    }

    #[test]
    fn test_icons() {
        let tmp = tempfile::tempdir().unwrap();
        let r = catalog(tmp.path());
        assert_eq!(body(r.handle("/PSP/ULES00002/ICON0.PNG").unwrap()), "PNG");
        assert_eq!(body(r.handle("/icon/00000003/ICON0.PNG").unwrap()), "PNG");
        assert!(r.handle("/icon/00000001/ICON0.PNG").is_err());
    }

    // ── FileRouter ──

    #[test]
    fn test_file_router_rejects_traversal() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("root/sub dir")).unwrap();
        fs::write(tmp.path().join("root/sub dir/a.txt"), "A").unwrap();
        fs::write(tmp.path().join("secret.txt"), "S").unwrap();
        let r = FileRouter::new(&tmp.path().join("root"));

        assert_eq!(body(r.handle(&percent_decode("/sub%20dir/a.txt")).unwrap()), "A");
        assert!(body(r.handle("/").unwrap()).contains("sub dir/"));
        assert!(r.handle("/../secret.txt").is_err());
        assert!(r.handle("/sub dir/../../secret.txt").is_err());
    }
}
