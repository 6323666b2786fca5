#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(values) = ivalue_pickle::values_from_slice(data, Default::default()) {
        // Whatever decodes has to encode again.
        assert!(ivalue_pickle::values_to_vec(&values, Default::default()).is_ok());
    }
});
