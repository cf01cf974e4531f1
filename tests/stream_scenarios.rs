//! End-to-end scenarios from the chained memory-block stream specification
//! (splice overwrite, splice insert across a block boundary, and
//! release-on-read), exercised against the crate's public surface rather
//! than `stream::core`'s own internal unit tests.

use std::io::SeekFrom;

use strata::stream::{MemoryBlock, MemoryBlockStream};

fn chain_of(bytes: &[u8]) -> Box<MemoryBlock> {
    let mut block = Box::new(MemoryBlock::new(bytes.len().max(1)));
    block.capacity_slice_mut()[..bytes.len()].copy_from_slice(bytes);
    block.set_length(bytes.len());
    block
}

#[test]
fn splice_overwrite_replaces_bytes_in_place_without_growing_the_stream() {
    let mut stream = MemoryBlockStream::new(80 * 1024, None, false);
    stream.write(&(0u8..10).collect::<Vec<_>>()).unwrap();

    stream.seek(SeekFrom::Start(3)).unwrap();
    stream
        .inject_buffer_at_current_position(chain_of(&[0xAA, 0xBB, 0xCC]), true, true)
        .unwrap();

    assert_eq!(stream.position(), 6);
    assert_eq!(stream.len(), 10);

    stream.seek(SeekFrom::Start(0)).unwrap();
    let mut buf = vec![0u8; 10];
    stream.read(&mut buf).unwrap();
    assert_eq!(buf, vec![0, 1, 2, 0xAA, 0xBB, 0xCC, 6, 7, 8, 9]);
}

#[test]
fn splice_insert_crossing_a_block_boundary_grows_the_stream_and_preserves_tail() {
    let mut stream = MemoryBlockStream::new(4, None, false);
    stream.write(&(0u8..8).collect::<Vec<_>>()).unwrap();

    stream.seek(SeekFrom::Start(3)).unwrap();
    stream
        .inject_buffer_at_current_position(chain_of(&[0xAA, 0xBB, 0xCC, 0xDD, 0xEE]), false, false)
        .unwrap();

    assert_eq!(stream.position(), 3, "advance_position=false leaves the cursor where it was");
    assert_eq!(stream.len(), 13);

    stream.seek(SeekFrom::Start(0)).unwrap();
    let mut buf = vec![0u8; 13];
    stream.read(&mut buf).unwrap();
    assert_eq!(buf, vec![0, 1, 2, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 3, 4, 5, 6, 7]);
}

#[test]
fn splice_at_block_boundary_overwrite_consumes_the_old_bytes_it_replaces() {
    let mut stream = MemoryBlockStream::new(4, None, false);
    stream.write(&(0u8..8).collect::<Vec<_>>()).unwrap();

    stream.seek(SeekFrom::Start(4)).unwrap();
    stream
        .inject_buffer_at_current_position(chain_of(&[0xAA, 0xBB]), true, true)
        .unwrap();

    assert_eq!(stream.len(), 8);
    stream.seek(SeekFrom::Start(0)).unwrap();
    let mut buf = vec![0u8; 8];
    stream.read(&mut buf).unwrap();
    assert_eq!(buf, vec![0, 1, 2, 3, 0xAA, 0xBB, 6, 7]);
}

#[test]
fn release_on_read_drops_fully_consumed_blocks_and_stops_seeking() {
    let mut stream = MemoryBlockStream::new(3, None, false);
    stream.write(&(0u8..9).collect::<Vec<_>>()).unwrap();
    stream.seek(SeekFrom::Start(0)).unwrap();

    stream.set_release_on_read(true);
    assert!(!stream.is_seekable());

    let mut buf = vec![0u8; 4];
    let n = stream.read(&mut buf).unwrap();
    assert_eq!(n, 4);
    assert_eq!(buf, vec![0, 1, 2, 3]);

    // the first of three 3-byte blocks is now fully consumed and released
    assert_eq!(stream.block_count(), 2);
    assert_eq!(stream.first_block_offset(), 3);
    assert_eq!(stream.len(), 9);

    assert!(stream.seek(SeekFrom::Start(0)).is_err());

    let mut rest = vec![0u8; 5];
    let n = stream.read(&mut rest).unwrap();
    assert_eq!(n, 5);
    assert_eq!(rest, vec![4, 5, 6, 7, 8]);
    assert_eq!(stream.block_count(), 0);
}

#[test]
fn append_attach_detach_move_a_whole_chain_between_streams() {
    let mut a = MemoryBlockStream::new(4, None, false);
    a.write(&[1, 2, 3]).unwrap();

    let mut b = MemoryBlockStream::new(4, None, false);
    b.write(&[9, 9]).unwrap();
    let detached = b.detach_buffer().unwrap();
    assert_eq!(b.len(), 0);

    a.attach_buffer(Some(detached));
    assert_eq!(a.len(), 0);
    assert_eq!(a.position(), 0);

    let mut buf = vec![0u8; 2];
    a.read(&mut buf).unwrap();
    assert_eq!(buf, vec![9, 9]);
}

#[test]
fn io_trait_impls_round_trip_through_std_read_write_seek() {
    use std::io::{Read, Seek, Write};

    let mut stream = MemoryBlockStream::new(8, None, false);
    Write::write_all(&mut stream, b"hello world").unwrap();
    stream.seek(SeekFrom::Start(6)).unwrap();

    let mut rest = String::new();
    stream.read_to_string(&mut rest).unwrap();
    assert_eq!(rest, "world");
}
