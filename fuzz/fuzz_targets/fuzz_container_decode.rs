#![no_main]
use crudearch::EntryStore;
use libfuzzer_sys::fuzz_target;

// Any byte stream either loads or fails with an error; a loaded store must
// save back to a stream that loads to the same entries
fuzz_target!(|data: &[u8]| {
    let Ok(store) = EntryStore::load(data) else {
        return;
    };
    let saved = store.save().expect("loaded store re-encodes");
    let reloaded = EntryStore::load(&saved).expect("re-encoded store loads");
    assert_eq!(reloaded.list(), store.list());
});
