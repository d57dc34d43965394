use std::path::{Path, PathBuf};

use itertools::Itertools;

use crate::errors::AnalysisError;

pub const DEFAULT_PACKAGE_ENV: &str = "DAGGER_DEFAULT_PYTHON_PACKAGE";
pub const DEFAULT_PACKAGE: &str = "main";

pub fn default_package() -> String {
    std::env::var(DEFAULT_PACKAGE_ENV)
        .ok()
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| DEFAULT_PACKAGE.to_string())
}

/// Locates `<root>/src/<package>`, falling back to `<root>/<package>`.
pub fn package_dir(root: &Path, package: &str) -> Result<PathBuf, AnalysisError> {
    [root.join("src").join(package), root.join(package)]
        .into_iter()
        .find(|dir| dir.is_dir())
        .ok_or_else(|| {
            AnalysisError::input(format!(
                "package `{package}` not found under `{}`",
                root.display()
            ))
        })
}

/// Lists the package's sources: `__init__.py` first, the remaining top-level
/// files by name, then files one directory deep.
pub fn find_module_files(root: &Path, package: &str) -> Result<Vec<PathBuf>, AnalysisError> {
    let dir = package_dir(root, package)?;

    let mut files = vec![];
    let init = dir.join("__init__.py");
    if init.is_file() {
        files.push(init);
    }

    files.extend(
        python_files(&dir)?
            .into_iter()
            .filter(|f| f.file_name().is_some_and(|n| n != "__init__.py")),
    );

    for subdir in subdirectories(&dir)? {
        files.extend(python_files(&subdir)?);
    }

    if files.is_empty() {
        return Err(AnalysisError::input(format!(
            "no python files found in `{}`",
            dir.display()
        )));
    }

    Ok(files)
}

fn entries(dir: &Path) -> Result<Vec<PathBuf>, AnalysisError> {
    let read = std::fs::read_dir(dir).map_err(|e| {
        AnalysisError::input(format!("failed to read `{}`: {e}", dir.display()))
    })?;

    let mut paths = vec![];
    for entry in read {
        let entry = entry.map_err(|e| {
            AnalysisError::input(format!("failed to read `{}`: {e}", dir.display()))
        })?;
        paths.push(entry.path());
    }

    Ok(paths.into_iter().sorted().collect())
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.') || n == "__pycache__")
}

fn python_files(dir: &Path) -> Result<Vec<PathBuf>, AnalysisError> {
    Ok(entries(dir)?
        .into_iter()
        .filter(|p| p.is_file() && !is_hidden(p))
        .filter(|p| p.extension().is_some_and(|ext| ext == "py"))
        .collect())
}

fn subdirectories(dir: &Path) -> Result<Vec<PathBuf>, AnalysisError> {
    Ok(entries(dir)?
        .into_iter()
        .filter(|p| p.is_dir() && !is_hidden(p))
        .collect())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn orders_init_then_files_then_subpackages() {
        let root = tempfile::tempdir().unwrap();
        let pkg = root.path().join("src").join("main");
        std::fs::create_dir_all(pkg.join("utils")).unwrap();
        std::fs::create_dir_all(pkg.join("__pycache__")).unwrap();
        for file in [
            "b.py",
            "a.py",
            "__init__.py",
            "notes.txt",
            "utils/x.py",
            "__pycache__/a.py",
        ] {
            std::fs::write(pkg.join(file), "").unwrap();
        }

        let files = find_module_files(root.path(), "main").unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|f| {
                f.strip_prefix(&pkg)
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect();

        assert_eq!(names, vec!["__init__.py", "a.py", "b.py", "utils/x.py"]);
    }

    #[test]
    fn falls_back_to_flat_layout() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("ci")).unwrap();
        std::fs::write(root.path().join("ci").join("main.py"), "").unwrap();

        let files = find_module_files(root.path(), "ci").unwrap();

        assert_eq!(files, vec![root.path().join("ci").join("main.py")]);
    }

    #[test]
    fn missing_package() {
        let root = tempfile::tempdir().unwrap();

        let err = find_module_files(root.path(), "main").unwrap_err();

        assert_eq!(err.kind(), "AnalysisError");
    }
}
