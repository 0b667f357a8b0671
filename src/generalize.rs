use crate::template::{Template, Token};

/// Builds the generalized template for `seq` after it matched `existing`.
///
/// `seq` is walked position by position while `lcs` is consumed greedily. A
/// position keeps its literal when its token is the next LCS token; everything
/// else becomes a wildcard. A wildcard in `existing` stays a wildcard even when the
/// token there takes part in the alignment. Mismatched runs are not collapsed, so
/// every position keeps its own slot.
pub fn merge<S>(lcs: &[S], seq: &[String], existing: &Template) -> Template
where
    S: AsRef<str>,
{
    let mut pending = lcs.iter().map(AsRef::as_ref).peekable();

    let tokens = seq
        .iter()
        .enumerate()
        .map(|(idx, tok)| {
            let aligned = pending.peek().is_some_and(|next| *next == tok.as_str());
            if aligned {
                pending.next();
            }
            match existing.get(idx) {
                Some(Token::Wildcard) => Token::Wildcard,
                _ if aligned => Token::Literal(tok.clone()),
                _ => Token::Wildcard,
            }
        })
        .collect();

    Template::new(tokens)
}

/// Convenience used by the registry: returns the merged template only when it differs.
pub fn generalize(lcs: &[String], seq: &[String], existing: &Template) -> Option<Template> {
    let merged = merge(lcs, seq, existing);
    (merged != *existing).then_some(merged)
}
