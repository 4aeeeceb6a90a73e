use rand::Rng;

/// Confidence attached to fallback replies in deterministic mode. Keyword
/// matches are exact, so this sits near the top of the [0.85, 1.0) band.
const DETERMINISTIC_CONFIDENCE: f64 = 0.9;

/// How uncategorized queries pick a canned reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackMode {
    /// Always the recommendations entry. Reproducible, the default.
    Deterministic,
    /// Uniformly random entry with a jittered confidence, for demo freshness.
    Randomized,
}

#[derive(Debug, Clone)]
pub struct FallbackReply {
    pub text: String,
    pub sources: Vec<String>,
    pub confidence: f64,
}

struct CannedResponse {
    keywords: &'static [&'static str],
    text: &'static str,
    sources: &'static [&'static str],
}

// Checked top to bottom; the first category with a keyword hit wins. The
// last entry has no keywords and serves as the deterministic default.
const RESPONSES: &[CannedResponse] = &[
    CannedResponse {
        keywords: &["support", "contact"],
        text: "For Lisec technical support, you can contact us through multiple channels:\n\n• Phone: +43 7427 200-0\n• Email: service@lisec.com\n• Online Portal: support.lisec.com\n• Emergency Hotline: Available 24/7 for critical issues\n\nOur support team is available Monday-Friday, 8:00-17:00 CET.",
        sources: &["Lisec Contact Directory", "Support Portal"],
    },
    CannedResponse {
        keywords: &["maintenance", "schedule"],
        text: "Lisec machine maintenance schedules depend on your specific model and usage:\n\n• Daily: Visual inspection, cleaning\n• Weekly: Lubrication check, safety systems test\n• Monthly: Filter replacement, calibration check\n• Quarterly: Comprehensive inspection by certified technician\n\nI recommend checking your machine's specific maintenance manual for detailed schedules.",
        sources: &["Maintenance Manual", "Service Guidelines"],
    },
    CannedResponse {
        keywords: &["parts", "order", "spare"],
        text: "To order spare parts for your Lisec machine:\n\n1. Visit parts.lisec.com\n2. Use your machine serial number for compatibility\n3. Contact your local Lisec distributor\n4. Call our parts department: +43 7427 200-2600\n\nOriginal Lisec parts ensure optimal performance and maintain warranty coverage.",
        sources: &["Parts Catalog", "Order System"],
    },
    CannedResponse {
        keywords: &["light", "signal", "indicator"],
        text: "Lisec machine light signals indicate different operational states:\n\n• Green: Normal operation\n• Yellow/Amber: Warning - check required\n• Red: Error/Stop - immediate attention needed\n• Blue: Maintenance mode active\n• Flashing: Transitional state\n\nRefer to your machine's manual for model-specific light codes.",
        sources: &["Machine Manual", "Diagnostic Guide"],
    },
    CannedResponse {
        keywords: &[],
        text: "Based on your machine's current status, I recommend:\n\n• Checking hydraulic pressure levels\n• Inspecting cutting wheel condition\n• Verifying glass positioning sensors\n• Updating machine software if available\n\nWould you like detailed instructions for any of these checks?",
        sources: &["Diagnostic System", "Maintenance Database"],
    },
];

/// Local substitute reply generator, used whenever the remote assistant is
/// unreachable or rejects the request.
pub struct FallbackResponder {
    mode: FallbackMode,
}

impl FallbackResponder {
    pub fn new(mode: FallbackMode) -> Self {
        Self { mode }
    }

    /// Pure keyword lookup over the canned table. Category matches are always
    /// deterministic; only the no-match case consults `mode`.
    pub fn respond(&self, user_text: &str) -> FallbackReply {
        let lower = user_text.to_lowercase();

        for response in RESPONSES {
            if response.keywords.iter().any(|kw| lower.contains(kw)) {
                return Self::reply(response, DETERMINISTIC_CONFIDENCE);
            }
        }

        match self.mode {
            FallbackMode::Deterministic => {
                Self::reply(RESPONSES.last().unwrap(), DETERMINISTIC_CONFIDENCE)
            }
            FallbackMode::Randomized => {
                let mut rng = rand::thread_rng();
                let pick = &RESPONSES[rng.gen_range(0..RESPONSES.len())];
                Self::reply(pick, 0.85 + rng.gen::<f64>() * 0.15)
            }
        }
    }

    fn reply(response: &CannedResponse, confidence: f64) -> FallbackReply {
        FallbackReply {
            text: response.text.to_string(),
            sources: response.sources.iter().map(|s| s.to_string()).collect(),
            confidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deterministic() -> FallbackResponder {
        FallbackResponder::new(FallbackMode::Deterministic)
    }

    #[test]
    fn support_queries_always_hit_the_support_category() {
        let responder = deterministic();
        for text in ["contact support", "I need SUPPORT now", "how to contact you"] {
            let reply = responder.respond(text);
            assert!(reply.text.contains("Lisec technical support"), "{text}");
            assert_eq!(
                reply.sources,
                ["Lisec Contact Directory", "Support Portal"]
            );
        }
    }

    #[test]
    fn maintenance_queries_hit_the_maintenance_category() {
        let reply = deterministic().respond("How often should I carry out basic maintenance?");
        assert!(reply.text.contains("maintenance schedules"));
        assert_eq!(reply.sources, ["Maintenance Manual", "Service Guidelines"]);
    }

    #[test]
    fn category_order_breaks_keyword_ties() {
        // "support" outranks "parts" because categories are checked in order.
        let reply = deterministic().respond("support for ordering parts");
        assert!(reply.text.contains("Lisec technical support"));
    }

    #[test]
    fn unmatched_queries_get_the_default_entry_in_deterministic_mode() {
        let first = deterministic().respond("what is the weather like");
        let second = deterministic().respond("what is the weather like");
        assert_eq!(first.text, second.text);
        assert!(first.text.contains("I recommend"));
        assert_eq!(first.confidence, DETERMINISTIC_CONFIDENCE);
    }

    #[test]
    fn replies_always_carry_sources_and_bounded_confidence() {
        for responder in [
            FallbackResponder::new(FallbackMode::Deterministic),
            FallbackResponder::new(FallbackMode::Randomized),
        ] {
            for text in ["support", "maintenance", "spare parts", "light codes", "???"] {
                let reply = responder.respond(text);
                assert!(!reply.sources.is_empty());
                assert!((0.85..1.0).contains(&reply.confidence));
            }
        }
    }

    #[test]
    fn light_signal_queries_hit_the_diagnostics_category() {
        let reply = deterministic().respond("what does the red indicator mean");
        assert!(reply.text.contains("light signals"));
    }
}
