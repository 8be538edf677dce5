//! Canned replies used when the backend cannot answer

/// Ordered (keywords, reply) rows; the first row with a matching keyword wins
const REPLIES: &[(&[&str], &str)] = &[
    (
        &["नमस्कार", "हॅलो", "hello"],
        "नमस्कार! मी शेवंता आहे. तुम्हाला कसे मदत करू शकते?",
    ),
    (
        &["तुझे नाव", "name"],
        "माझे नाव शेवंता आहे. मी एक आवाज सहाय्यक आहे.",
    ),
    (
        &["कसे आहेस", "how are you"],
        "मी ठीक आहे, धन्यवाद! तुम्ही कसे आहात?",
    ),
    (
        &["धन्यवाद", "thank you"],
        "तुमचे स्वागत आहे! मला तुमची मदत करून आनंद झाला.",
    ),
    (&["बाय", "bye"], "अलविदा! पुन्हा भेटूया!"),
];

/// Reply when no row matches
const CATCH_ALL: &str = "मला समजले. तुम्ही आणखी काही विचारू शकता.";

/// Pick the canned reply for `input` by case-insensitive substring match
pub fn local_fallback(input: &str) -> &'static str {
    let lowered = input.to_lowercase();
    REPLIES
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| lowered.contains(k)))
        .map_or(CATCH_ALL, |(_, reply)| *reply)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_greeting_keywords() {
        let expected = "नमस्कार! मी शेवंता आहे. तुम्हाला कसे मदत करू शकते?";
        assert_eq!(local_fallback("नमस्कार"), expected);
        assert_eq!(local_fallback("HELLO there"), expected);
        assert_eq!(local_fallback("अरे हॅलो"), expected);
    }

    #[test]
    fn test_first_matching_row_wins() {
        // Matches both the greeting row and the name row
        assert_eq!(
            local_fallback("hello, what is your name?"),
            "नमस्कार! मी शेवंता आहे. तुम्हाला कसे मदत करू शकते?"
        );
        assert_eq!(
            local_fallback("Thank You and BYE"),
            "तुमचे स्वागत आहे! मला तुमची मदत करून आनंद झाला."
        );
    }

    #[test]
    fn test_catch_all() {
        assert_eq!(local_fallback(""), CATCH_ALL);
        assert_eq!(local_fallback("आज हवामान कसे आहे"), CATCH_ALL);
    }

    #[test]
    fn test_replies_are_never_empty() {
        assert!(!CATCH_ALL.trim().is_empty());
        for (keywords, reply) in REPLIES {
            assert!(!keywords.is_empty());
            assert!(keywords.iter().all(|k| *k == k.to_lowercase()));
            assert!(!reply.trim().is_empty());
        }
    }
}
