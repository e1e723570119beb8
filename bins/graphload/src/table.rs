use clap::ValueEnum;

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug, Default)]
pub enum OutputFormat {
    /// Tab-separated values
    Tsv,
    /// Formatted table with aligned columns (default)
    #[default]
    Table,
}

/// Collects rows and prints them with column alignment
pub struct TablePrinter {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    format: OutputFormat,
}

impl TablePrinter {
    pub fn new(headers: Vec<&str>, format: OutputFormat) -> Self {
        Self {
            headers: headers.into_iter().map(|s| s.to_string()).collect(),
            rows: Vec::new(),
            format,
        }
    }

    pub fn add_row(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    pub fn print(&self) {
        print!("{}", self.render());
    }

    pub fn render(&self) -> String {
        match self.format {
            OutputFormat::Tsv => self.render_tsv(),
            OutputFormat::Table => self.render_table(),
        }
    }

    fn render_tsv(&self) -> String {
        let mut out = String::new();
        for row in &self.rows {
            out.push_str(&row.join("\t"));
            out.push('\n');
        }
        out
    }

    fn render_table(&self) -> String {
        if self.rows.is_empty() {
            return String::new();
        }

        let mut widths: Vec<usize> = self.headers.iter().map(|h| h.len()).collect();
        for row in &self.rows {
            for (i, cell) in row.iter().enumerate() {
                if i < widths.len() {
                    widths[i] = widths[i].max(cell.len());
                }
            }
        }

        let align = |cells: &[String]| -> String {
            cells
                .iter()
                .enumerate()
                .map(|(i, cell)| {
                    format!("{:width$}", cell, width = widths.get(i).copied().unwrap_or(0))
                })
                .collect::<Vec<_>>()
                .join("  ")
                .trim_end()
                .to_string()
        };

        let mut out = align(&self.headers);
        out.push('\n');
        let sep: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        out.push_str(&sep.join("  "));
        out.push('\n');
        for row in &self.rows {
            out.push_str(&align(row));
            out.push('\n');
        }
        out
    }
}
