#![no_main]

use faultcast::config::MappingConfig;
use faultcast::mapper::PageMapper;
use faultcast::page_stats::PageStatParser;
use faultcast::perf_script;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // Neither parser may panic on arbitrary text
        let _ = perf_script::parse_base_address(input);

        let Ok(mapper) = PageMapper::new(&MappingConfig::new(0x7f00_0000_0000, 4096, 64)) else {
            return;
        };
        let mut parser = PageStatParser::new(mapper);
        parser.ingest_lines(input.lines());
        let d = parser.diagnostics();
        assert_eq!(d.lines, input.lines().count() as u64);
        assert!(d.counted <= d.matched);
    }
});
