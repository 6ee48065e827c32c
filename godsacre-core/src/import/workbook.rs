//! Tabular document reader
//!
//! Loads a spreadsheet workbook, a single CSV file or a directory of CSV
//! files into named sheets of raw [`Cell`]s. The first row of every sheet
//! is its header row.

use std::fs;
use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};

use crate::domain::result::{Error, Result};

use super::cell::Cell;

const WORKBOOK_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xls", "xlsb", "ods"];

/// One named sheet: a header row plus data rows
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Sheet {
    /// Build a sheet from its raw rows; the first row becomes the header
    pub fn from_rows(name: impl Into<String>, mut rows: Vec<Vec<Cell>>) -> Self {
        let headers = if rows.is_empty() {
            Vec::new()
        } else {
            rows.remove(0)
                .iter()
                .map(|cell| cell.to_text().unwrap_or_default())
                .collect()
        };
        Self {
            name: name.into(),
            headers,
            rows,
        }
    }

    /// Position of a header; names are compared after trimming
    pub fn column_index(&self, header: &str) -> Option<usize> {
        let wanted = header.trim();
        self.headers.iter().position(|h| h.trim() == wanted)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Workbook {
    sheets: Vec<Sheet>,
}

impl Workbook {
    /// Open a workbook file, a `.csv` file or a directory of `.csv` files
    pub fn open(path: &Path) -> Result<Self> {
        if path.is_dir() {
            return Self::open_csv_dir(path);
        }
        if !path.exists() {
            return Err(Error::workbook(format!("{} does not exist", path.display())));
        }

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        if extension == "csv" {
            Ok(Self::from_sheets(vec![read_csv(path)?]))
        } else if WORKBOOK_EXTENSIONS.contains(&extension.as_str()) {
            Self::open_spreadsheet(path)
        } else {
            Err(Error::workbook(format!(
                "unsupported file type '{}': expected one of {} or csv",
                extension,
                WORKBOOK_EXTENSIONS.join(", ")
            )))
        }
    }

    pub fn from_sheets(sheets: Vec<Sheet>) -> Self {
        Self { sheets }
    }

    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }

    fn open_spreadsheet(path: &Path) -> Result<Self> {
        let mut workbook = open_workbook_auto(path)
            .map_err(|e| Error::workbook(format!("Failed to open {}: {}", path.display(), e)))?;

        let names = workbook.sheet_names().to_vec();
        let mut sheets = Vec::with_capacity(names.len());
        for name in names {
            let range = workbook
                .worksheet_range(&name)
                .map_err(|e| Error::workbook(format!("Failed to read sheet '{}': {}", name, e)))?;
            let rows = range
                .rows()
                .map(|row| row.iter().map(cell_from_data).collect())
                .collect();
            sheets.push(Sheet::from_rows(name, rows));
        }
        Ok(Self { sheets })
    }

    fn open_csv_dir(dir: &Path) -> Result<Self> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            let is_csv = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
            if path.is_file() && is_csv {
                paths.push(path);
            }
        }
        paths.sort();

        if paths.is_empty() {
            return Err(Error::workbook(format!(
                "{} contains no .csv files",
                dir.display()
            )));
        }

        let sheets = paths
            .iter()
            .map(|path| read_csv(path))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { sheets })
    }
}

fn read_csv(path: &Path) -> Result<Sheet> {
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| Error::workbook(format!("Invalid file name: {}", path.display())))?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|e| Error::workbook(format!("Failed to read {}: {}", path.display(), e)))?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record
            .map_err(|e| Error::workbook(format!("Failed to read {}: {}", path.display(), e)))?;
        rows.push(record.iter().map(|field| Cell::Text(field.to_string())).collect());
    }
    Ok(Sheet::from_rows(name, rows))
}

fn cell_from_data(data: &Data) -> Cell {
    match data {
        Data::Empty | Data::Error(_) => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        Data::Float(f) => Cell::Number(*f),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Bool(b) => Cell::Bool(*b),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(datetime) => Cell::Date(datetime.date()),
            None => Cell::Number(dt.as_f64()),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sheet_headers_are_trimmed() {
        let sheet = Sheet::from_rows(
            "Operatii",
            vec![
                vec![Cell::from(" Tip "), Cell::from("Nume")],
                vec![Cell::from("b"), Cell::from("Ion")],
            ],
        );
        assert_eq!(sheet.column_index("Tip"), Some(0));
        assert_eq!(sheet.column_index("Nume "), Some(1));
        assert_eq!(sheet.column_index("Data"), None);
        assert_eq!(sheet.rows.len(), 1);
    }

    #[test]
    fn test_csv_file_named_by_stem() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Operatii.csv");
        fs::write(&path, "Tip,Nume\nb,Ion Pop\n,\n").unwrap();

        let workbook = Workbook::open(&path).unwrap();
        let sheet = workbook.sheet("Operatii").unwrap();
        assert_eq!(sheet.headers, vec!["Tip", "Nume"]);
        assert_eq!(sheet.rows.len(), 2);
        assert_eq!(sheet.rows[0][1], Cell::from("Ion Pop"));
    }

    #[test]
    fn test_csv_directory() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("Acte.csv"), "Act\n1/17\n").unwrap();
        fs::write(dir.path().join("Plati.csv"), "An\n2020\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let workbook = Workbook::open(dir.path()).unwrap();
        assert_eq!(workbook.sheet_names(), vec!["Acte", "Plati"]);
    }

    #[test]
    fn test_unsupported_and_missing_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("register.txt");
        fs::write(&path, "x").unwrap();
        assert!(matches!(Workbook::open(&path), Err(Error::Workbook(_))));
        assert!(matches!(
            Workbook::open(&dir.path().join("gone.xlsx")),
            Err(Error::Workbook(_))
        ));
    }

    #[test]
    fn test_xlsx_cells() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("register.xlsx");
        let mut book = rust_xlsxwriter::Workbook::new();
        let sheet = book.add_worksheet();
        sheet.set_name("Intretinere").unwrap();
        sheet.write_string(0, 0, "Loc veci").unwrap();
        sheet.write_string(0, 1, "An").unwrap();
        sheet.write_string(1, 0, "A1-1-1").unwrap();
        sheet.write_number(1, 1, 2020).unwrap();
        book.save(&path).unwrap();

        let workbook = Workbook::open(&path).unwrap();
        let sheet = workbook.sheet("Intretinere").unwrap();
        assert_eq!(sheet.column_index("An"), Some(1));
        assert_eq!(sheet.rows[0][1].as_integer(), Some(2020));
    }
}
