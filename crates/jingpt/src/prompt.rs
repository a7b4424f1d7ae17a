//! System prompt for the document assistant.

use chrono::NaiveDate;

/// Which sources the model can reach in this request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sources {
    pub confluence: bool,
}

/// Builds the system prompt for a request made on `today`.
#[must_use]
pub fn system_prompt(sources: Sources, today: NaiveDate) -> String {
    let mut available = vec![
        "- SharePoint: portfolio company documents such as cap tables (Excel), \
         financial statements and contracts (PDF). Use search_sharepoint, then \
         read_excel_sheet or read_pdf with the drive_id and item_id from a result.",
    ];
    if sources.confluence {
        available.push(
            "- Confluence: wiki pages such as investment memos, meeting notes and \
             company profiles. Use search_confluence, then read_confluence_page.",
        );
    }

    format!(
        "You are JinGPT, an assistant that answers questions about portfolio \
         companies using internal documents.\n\
         \n\
         Today's date is {today}.\n\
         \n\
         Available sources:\n\
         {sources}\n\
         \n\
         Guidelines:\n\
         - Search before reading. Read the most relevant documents before answering.\n\
         - For an Excel file, list its worksheets first unless you already know the sheet name.\n\
         - Never invent figures. Only report numbers that appear in the documents you read.\n\
         - If nothing relevant is found, say so plainly.\n\
         - Cite the documents you used by title.\n\
         - If a tool reports an authorization error, ask the user to log in again.\n\
         - Answer in the language the user wrote in.",
        today = today.format("%Y-%m-%d"),
        sources = available.join("\n"),
    )
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 14).unwrap()
    }

    #[test]
    fn test_prompt_without_confluence() {
        let prompt = system_prompt(Sources { confluence: false }, day());
        assert!(prompt.contains("2025-03-14"));
        assert!(prompt.contains("search_sharepoint"));
        assert!(!prompt.contains("Confluence"));
        assert!(prompt.contains("Never invent figures"));
    }

    #[test]
    fn test_prompt_with_confluence() {
        let prompt = system_prompt(Sources { confluence: true }, day());
        assert!(prompt.contains("search_confluence"));
        assert!(prompt.contains("read_confluence_page"));
    }
}
