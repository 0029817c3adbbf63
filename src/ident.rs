//! Identifier quoting for catalog-confirmed names
//! ----------------------------------------------
//! Single source of truth for splicing table/column names into DDL. The
//! names come from the catalog itself (or from our own expected-shape
//! constants), never from user input; quoting here guards against embedded
//! quote characters, not against arbitrary injection.

/// Wrap an identifier in double quotes, doubling any embedded quote.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_plain_identifier() {
        assert_eq!(quote_ident("Users"), "\"Users\"");
        assert_eq!(quote_ident("PasswordHash"), "\"PasswordHash\"");
    }

    #[test]
    fn doubles_embedded_quotes() {
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(quote_ident("\""), "\"\"\"\"");
    }
}
