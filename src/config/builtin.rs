// src/config/builtin.rs

//! Default pipeline for a conventional `app/` front-end project.
//!
//! Used when no config file exists, and written out by `assetpipe init`.

pub const DEFAULT_CONFIG: &str = r#"# Assetpipe.toml

[config]
triggered_while_running_behaviour = "queue"
queue_length = 1
debounce_ms = 100
cache_storage = "file"

[paths]
source = "app"
staging = ".tmp"
output = "dist"
keep = [".git"]

[build]
tasks = ["default"]

[serve]
port = 3000
dist_port = 3001
tasks = ["copy-modules", "scripts", "styles"]

[task.copy]
kind = "pipeline"
src = ["app/*"]
exclude = ["app/*.html"]
only = "release"

[task.copy-modules]
kind = "pipeline"
src = ["node_modules/bootstrap-sass/assets/fonts/**/*"]
base = "node_modules"
dest = "modules"
roots = "both"

[task.styles]
kind = "pipeline"
src = ["app/styles/main.scss"]
dest = "styles"
watch = ["app/styles/**/*.{scss,css}"]
reload = "styles"

[[task.styles.transform]]
use = "command"
cmd = "sass --stdin --load-path=node_modules/bootstrap-sass/assets/stylesheets"
ext = "css"

[[task.styles.transform]]
use = "minify-css"
when = "release"

[[task.styles.transform]]
use = "sourcemap"
when = "debug"

[task.lint]
kind = "lint"
src = ["app/scripts/**/*.js"]
watch = ["app/scripts/**/*.js"]
max_line_length = 80

[task.images]
kind = "pipeline"
src = ["app/images/**/*"]
dest = "images"
cache = true
only = "release"

[[task.images.transform]]
use = "optimize-image"

[task.scripts]
kind = "bundle"
entry = "app/scripts/main.js"
output = "scripts/main.js"
cmd = "npx browserify {entry}"
watch = ["app/scripts/**/*.js"]

[[task.scripts.transform]]
use = "minify-js"
when = "release"

[[task.scripts.transform]]
use = "sourcemap"
when = "debug"

[task.html]
kind = "pipeline"
src = ["app/**/*.html"]
base = "app"
only = "release"

[[task.html.transform]]
use = "minify-html"

[task.markup]
kind = "reload"
watch = ["app/**/*.html", "app/images/**/*"]

[task.default]
kind = "group"
after = ["styles", "lint", "html", "scripts", "images", "copy", "copy-modules"]
"#;
