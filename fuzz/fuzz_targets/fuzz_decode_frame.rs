#![no_main]

use libfuzzer_sys::fuzz_target;
use showdown_client::protocol::{decode_frame, BattleRequest, ChallengeUpdate, MessageKind};

fuzz_target!(|data: &[u8]| {
    let Ok(raw) = std::str::from_utf8(data) else {
        return;
    };

    for msg in decode_frame(raw) {
        // Content must rejoin into the tail of its line.
        let payload = msg.payload();
        assert!(raw.contains(payload.as_str()));
        let _ = msg.ends_match();

        match msg.kind {
            MessageKind::Request => {
                if let Ok(request) = BattleRequest::parse(&payload) {
                    let _ = request.action();
                    let _ = request.legal_moves();
                    let _ = request.legal_switches();
                }
            }
            MessageKind::UpdateChallenges => {
                let _ = ChallengeUpdate::parse(&payload);
            }
            _ => {}
        }
    }
});
