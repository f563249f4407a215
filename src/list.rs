//! Internal fixed-capacity doubly linked list backing the LRU recency order.
//!
//! Not meant to be used directly by crate consumers; it exposes unsafe raw
//! pointer operations that require careful invariant maintenance by its
//! single caller, [`crate::lru::LruCache`].

use std::boxed::Box;
use std::fmt;
use std::mem;
use std::num::NonZeroUsize;
use std::ptr::{self, NonNull};

/// A node in the doubly linked list.
///
/// Contains a value and pointers to the previous and next entries.
/// This structure is not meant to be used directly by users of the `List`.
pub struct Entry<T> {
    /// The value stored in this entry. Uses MaybeUninit to allow for sigil nodes.
    val: mem::MaybeUninit<T>,
    /// Pointer to the previous entry in the list.
    prev: *mut Entry<T>,
    /// Pointer to the next entry in the list.
    next: *mut Entry<T>,
}

impl<T> Entry<T> {
    /// Creates a new entry with the given value.
    fn new(val: T) -> Self {
        Entry {
            val: mem::MaybeUninit::new(val),
            prev: ptr::null_mut(),
            next: ptr::null_mut(),
        }
    }

    /// Creates a new sigil (sentinel) entry without initializing the value.
    ///
    /// Sigil entries are used as head and tail markers in the list.
    fn new_sigil() -> Self {
        Entry {
            val: mem::MaybeUninit::uninit(),
            prev: ptr::null_mut(),
            next: ptr::null_mut(),
        }
    }

    /// Safely extracts the value from this entry.
    ///
    /// # Safety
    ///
    /// This function is unsafe because it assumes the value is initialized.
    /// Should only be called on non-sigil nodes.
    pub unsafe fn get_value(&self) -> &T {
        self.val.assume_init_ref()
    }

    /// Safely extracts a mutable reference to the value from this entry.
    ///
    /// # Safety
    ///
    /// This function is unsafe because it assumes the value is initialized.
    /// Should only be called on non-sigil nodes.
    pub unsafe fn get_value_mut(&mut self) -> &mut T {
        self.val.assume_init_mut()
    }
}

/// A doubly linked list implementation with fixed capacity.
///
/// This list maintains a fixed capacity specified at creation time and provides
/// O(1) operations for adding, removing, and updating elements. The list uses
/// sentinel nodes (sigils) at the head and tail to simplify operations.
///
/// # Examples
///
/// ```ignore
/// use docengine_core::list::List;
/// use core::num::NonZeroUsize;
///
/// let mut list = List::new(NonZeroUsize::new(3).unwrap());
///
/// // Add elements to the list
/// let node1 = list.add(10).unwrap();
/// let node2 = list.add(20).unwrap();
///
/// // Update an element
/// unsafe {
///     list.update(node1, 15, false);
/// }
/// ```
pub struct List<T> {
    /// Maximum number of items the list can hold.
    cap: NonZeroUsize,
    /// Current number of items in the list.
    len: usize,
    /// Pointer to the head sentinel node.
    head: *mut Entry<T>,
    /// Pointer to the tail sentinel node.
    tail: *mut Entry<T>,
}

impl<T> List<T> {
    /// Creates a new List that holds at most `cap` items.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// use docengine_core::list::List;
    /// use core::num::NonZeroUsize;
    ///
    /// let list: List<u32> = List::new(NonZeroUsize::new(5).unwrap());
    /// assert_eq!(list.cap().get(), 5);
    /// ```
    pub fn new(cap: NonZeroUsize) -> List<T> {
        List::construct(cap)
    }
}

impl<T> List<T> {
    /// Creates a new list with the given capacity.
    ///
    /// This method sets up the sentinel nodes and links them together.
    fn construct(cap: NonZeroUsize) -> List<T> {
        let head = Box::into_raw(Box::new(Entry::new_sigil()));
        let tail = Box::into_raw(Box::new(Entry::new_sigil()));

        let cache = List {
            cap,
            len: 0,
            head,
            tail,
        };

        unsafe {
            // SAFETY: head and tail are newly allocated and valid pointers
            (*cache.head).next = cache.tail;
            (*cache.tail).prev = cache.head;
        }

        cache
    }

    /// Returns the maximum number of items the list can hold.
    pub fn cap(&self) -> NonZeroUsize {
        self.cap
    }

    /// Returns the current number of items in the list.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the list contains no items.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns true if the list is at capacity.
    #[allow(dead_code)]
    pub fn is_full(&self) -> bool {
        self.len == self.cap.get()
    }

    /// Removes the first (most recently added) item from the list.
    ///
    /// Returns the removed entry if the list is not empty.
    ///
    /// # Safety
    ///
    /// This method is safe because it properly manages all raw pointer operations
    /// and ensures no memory leaks or dangling pointers.
    pub fn remove_first(&mut self) -> Option<Box<Entry<T>>> {
        if self.is_empty() {
            return None;
        }
        // SAFETY: Both head and tail are valid pointers initialized in `construct`,
        // and we know the list is not empty, so there's at least one element between them
        let next = unsafe { (*self.head).next };
        if next != self.tail {
            unsafe {
                self._detach(next);
            }
            self.len -= 1;
            // SAFETY: next is a valid pointer as we just detached it
            unsafe { Some(Box::from_raw(next)) }
        } else {
            None
        }
    }

    /// Removes the last (least recently added) item from the list.
    ///
    /// Returns the removed entry if the list is not empty.
    ///
    /// # Safety
    ///
    /// This method is safe because it properly manages all raw pointer operations
    /// and ensures no memory leaks or dangling pointers.
    pub fn remove_last(&mut self) -> Option<Box<Entry<T>>> {
        if self.is_empty() {
            return None;
        }
        // SAFETY: Both head and tail are valid pointers initialized in `construct`,
        // and we know the list is not empty, so there's at least one element between them
        let prev = unsafe { (*self.tail).prev };
        if prev != self.head {
            unsafe {
                self._detach(prev);
            }
            self.len -= 1;
            // SAFETY: prev is a valid pointer as we just detached it
            unsafe { Some(Box::from_raw(prev)) }
        } else {
            None
        }
    }

    /// Detaches a node from the list and returns it as a Box.
    ///
    /// # Safety
    ///
    /// This function is unsafe because it takes a raw pointer parameter.
    /// The caller must ensure that `node` is a valid pointer to a node in the list
    /// (not null, not freed, and actually part of this list).
    pub unsafe fn remove(&mut self, node: *mut Entry<T>) -> Option<Box<Entry<T>>> {
        if self.is_empty() || node.is_null() || node == self.head || node == self.tail {
            return None;
        }

        unsafe {
            // SAFETY: Caller guarantees node is valid and part of this list
            // Detach the node from the list
            self._detach(node);
            self.len -= 1;

            // Return the specified node as a Box, not the first node
            Some(Box::from_raw(node))
        }
    }

    /// Detaches a node from the list without deallocating it.
    ///
    /// # Safety
    ///
    /// This function is unsafe because it dereferences raw pointers.
    /// The caller must ensure that `node` is a valid pointer to a node in the list
    /// (not null, not freed, and actually part of this list).
    unsafe fn _detach(&mut self, node: *mut Entry<T>) {
        // SAFETY: The caller guarantees that node is a valid entry in the list,
        // which means its prev and next pointers are also valid entries.
        unsafe {
            (*(*node).prev).next = (*node).next;
            (*(*node).next).prev = (*node).prev;
        }
    }

    /// Attaches a node after the head sentinel node.
    ///
    /// This effectively makes the node the first item in the list.
    ///
    /// # Safety
    ///
    /// This function is unsafe because it dereferences raw pointers.
    /// The caller must ensure that `node` is a valid pointer to a node that is
    /// not already in the list (e.g., newly allocated or previously detached).
    pub unsafe fn attach(&mut self, node: *mut Entry<T>) {
        // SAFETY: head is a valid pointer initialized in `construct`,
        // and the caller guarantees that node is a valid entry not already in the list
        (*node).next = (*self.head).next;
        (*node).prev = self.head;
        (*self.head).next = node;
        (*(*node).next).prev = node;
    }

    /// Attaches a node before the tail sentinel node.
    ///
    /// This effectively makes the node the last item in the list.
    ///
    /// # Safety
    ///
    /// This function is unsafe because it dereferences raw pointers.
    /// The caller must ensure that `node` is a valid pointer to a node that is
    /// not already in the list (e.g., newly allocated or previously detached).
    #[allow(dead_code)]
    pub unsafe fn attach_last(&mut self, node: *mut Entry<T>) {
        // SAFETY: tail is a valid pointer initialized in `construct`,
        // and the caller guarantees that node is a valid entry not already in the list
        (*node).next = self.tail;
        (*node).prev = (*self.tail).prev;
        (*self.tail).prev = node;
        (*(*node).prev).next = node;
    }

    /// Attaches a node from another list after the head sentinel node.
    ///
    /// This method should be used when moving a node between different lists.
    /// It increments the length of this list since it's gaining a node.
    ///
    /// # Safety
    ///
    /// This function is unsafe because it dereferences raw pointers.
    /// The caller must ensure that `node` is a valid pointer to a node that is
    /// not already in this list.
    pub unsafe fn attach_from_other_list(&mut self, node: *mut Entry<T>) {
        self.attach(node);
        self.len += 1;
    }

    /// Attaches a node from another list before the tail sentinel node.
    ///
    /// This method should be used when moving a node between different lists.
    /// It increments the length of this list since it's gaining a node.
    ///
    /// # Safety
    ///
    /// This function is unsafe because it dereferences raw pointers.
    /// The caller must ensure that `node` is a valid pointer to a node that is
    /// not already in this list.
    #[allow(dead_code)]
    pub unsafe fn attach_last_from_other_list(&mut self, node: *mut Entry<T>) {
        self.attach_last(node);
        self.len += 1;
    }

    /// Moves a node to the front of the list (after the head sentinel).
    ///
    /// # Safety
    ///
    /// This function is unsafe because it dereferences raw pointers.
    /// The caller must ensure that `node` points to a valid entry in the list.
    pub unsafe fn move_to_front(&mut self, node: *mut Entry<T>) {
        if node.is_null() || node == self.head || node == self.tail {
            return;
        }

        // If the node is already the first item, do nothing
        if (*self.head).next == node {
            return;
        }

        // Detach the node from its current position
        self._detach(node);

        // Reattach at the front
        self.attach(node);
    }

    /// Adds a value to the front of the list.
    ///
    /// Returns a pointer to the newly created entry, or None if the list is full.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// use docengine_core::list::List;
    /// use core::num::NonZeroUsize;
    ///
    /// let mut list = List::new(NonZeroUsize::new(2).unwrap());
    /// let node1 = list.add(10).unwrap();
    /// let node2 = list.add(20).unwrap();
    ///
    /// // List is now full
    /// assert!(list.add(30).is_none());
    /// ```
    ///
    /// # Safety
    ///
    /// This method is safe because it properly manages all raw pointer operations
    /// and ensures no memory leaks or dangling pointers.
    pub fn add(&mut self, v: T) -> Option<*mut Entry<T>> {
        if self.len == self.cap().get() {
            return None;
        }
        // SAFETY: Box::into_raw creates a valid raw pointer and we're using NonNull
        // to assert its non-nullness
        let node = unsafe { NonNull::new_unchecked(Box::into_raw(Box::new(Entry::new(v)))) };
        // SAFETY: node is a newly allocated entry that is not part of any list yet
        unsafe { self.attach(node.as_ptr()) };
        self.len += 1;
        Some(node.as_ptr())
    }

    /// Adds a value to the front of the list, bypassing the capacity check.
    ///
    /// This method allows the list to temporarily exceed its capacity.
    /// It should be used carefully and only when the total cache capacity allows it.
    ///
    /// Returns a pointer to the newly created entry.
    ///
    /// # Safety
    ///
    /// This method is safe because it properly manages all raw pointer operations
    /// and ensures no memory leaks or dangling pointers. However, the caller must
    /// ensure that bypassing the capacity is appropriate.
    pub fn add_unchecked(&mut self, v: T) -> *mut Entry<T> {
        // SAFETY: Box::into_raw creates a valid raw pointer and we're using NonNull
        // to assert its non-nullness
        let node = unsafe { NonNull::new_unchecked(Box::into_raw(Box::new(Entry::new(v)))) };
        // SAFETY: node is a newly allocated entry that is not part of any list yet
        unsafe { self.attach(node.as_ptr()) };
        self.len += 1;
        node.as_ptr()
    }

    /// Updates the value of the given node.
    ///
    /// Returns a tuple containing:
    /// - The old value (if `capturing` is true)
    /// - A boolean indicating whether the update was successful
    ///
    /// # Safety
    ///
    /// This function is unsafe because it dereferences a raw pointer. The caller must ensure
    /// that the `node` pointer is valid and points to an `Entry` within the list.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// use docengine_core::list::List;
    /// use core::num::NonZeroUsize;
    ///
    /// let mut list = List::new(NonZeroUsize::new(2).unwrap());
    /// let node = list.add(10).unwrap();
    ///
    /// // Update and capture the old value
    /// let (old_val, success) = unsafe { list.update(node, 99, true) };
    /// assert_eq!(old_val, Some(10));
    /// assert!(success);
    ///
    /// // Update without capturing the old value
    /// let (old_val, success) = unsafe { list.update(node, 123, false) };
    /// assert_eq!(old_val, None);
    /// assert!(success);
    /// ```
    pub unsafe fn update(
        &mut self,
        node: *mut Entry<T>,
        v: T,
        capturing: bool,
    ) -> (Option<T>, bool) {
        if node.is_null() {
            return (None, false);
        }
        let old_val =
            unsafe { mem::replace(&mut (*node).val, mem::MaybeUninit::new(v)).assume_init() };

        match capturing {
            true => (Some(old_val), true),
            false => (None, true),
        }
    }

    /// Gets an immutable reference to the value stored in the entry.
    ///
    /// # Safety
    ///
    /// This function is unsafe because it dereferences a raw pointer.
    /// The caller must ensure that the `node` pointer is valid and points to a
    /// non-sigil `Entry` within the list.
    #[allow(dead_code)]
    pub unsafe fn get_value(&self, node: *mut Entry<T>) -> Option<&T> {
        if node.is_null() || node == self.head || node == self.tail {
            None
        } else {
            Some((*node).get_value())
        }
    }

    /// Gets a mutable reference to the value stored in the entry.
    ///
    /// # Safety
    ///
    /// This function is unsafe because it dereferences a raw pointer.
    /// The caller must ensure that the `node` pointer is valid and points to a
    /// non-sigil `Entry` within the list.
    #[allow(dead_code)]
    pub unsafe fn get_value_mut(&mut self, node: *mut Entry<T>) -> Option<&mut T> {
        if node.is_null() || node == self.head || node == self.tail {
            None
        } else {
            Some((*node).get_value_mut())
        }
    }

    /// Clears the list, removing all entries.
    pub fn clear(&mut self) {
        while self.remove_first().is_some() {}
    }

    /// Returns the first (most recently added/promoted) node, if any.
    pub fn front(&self) -> Option<*mut Entry<T>> {
        // SAFETY: head is always a valid sentinel pointer.
        let next = unsafe { (*self.head).next };
        if next == self.tail {
            None
        } else {
            Some(next)
        }
    }

    /// Returns the node following `node` in recency order, if `node` is not
    /// the last entry.
    ///
    /// # Safety
    ///
    /// `node` must be a valid, currently-attached, non-sigil node of this list.
    pub unsafe fn next(&self, node: *mut Entry<T>) -> Option<*mut Entry<T>> {
        let next = (*node).next;
        if next == self.tail {
            None
        } else {
            Some(next)
        }
    }
}

impl<T> Drop for List<T> {
    /// Cleans up all resources used by the list.
    ///
    /// This includes:
    /// 1. Removing and deallocating all regular entries
    /// 2. Deallocating the sentinel nodes
    fn drop(&mut self) {
        // Remove all entries
        self.clear();

        // Free the sentinel nodes
        // SAFETY: head and tail are valid pointers initialized in `construct` and never modified
        // except to be replaced with null when freed. We check for null here as an extra precaution.
        unsafe {
            if !self.head.is_null() {
                let _ = Box::from_raw(self.head);
                self.head = ptr::null_mut();
            }
            if !self.tail.is_null() {
                let _ = Box::from_raw(self.tail);
                self.tail = ptr::null_mut();
            }
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for List<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("List")
            .field("capacity", &self.cap)
            .field("length", &self.len)
            .finish()
    }
}
